//! Minimal telnet client codec.
//!
//! Only what a remote game server needs to hand over a usable data channel:
//! window size (NAWS), terminal type, server echo and suppress-go-ahead.
//! Every other option is refused. Parsing is stateful so commands split across
//! reads are handled.

use std::collections::HashSet;

use tracing::debug;

pub const IAC: u8 = 255;
pub const DONT: u8 = 254;
pub const DO: u8 = 253;
pub const WONT: u8 = 252;
pub const WILL: u8 = 251;
pub const SB: u8 = 250;
pub const SE: u8 = 240;

pub const OPT_ECHO: u8 = 1;
pub const OPT_SGA: u8 = 3;
pub const OPT_TTYPE: u8 = 24;
pub const OPT_NAWS: u8 = 31;

const TTYPE_IS: u8 = 0;
const TTYPE_SEND: u8 = 1;

/// Upper bound on a buffered subnegotiation
const MAX_SUBNEGOTIATION: usize = 512;

#[derive(Clone, Copy, Debug, PartialEq)]
enum State {
    Data,
    /// Saw CR in data; a following NUL is padding
    DataCr,
    Iac,
    /// Saw IAC WILL/WONT/DO/DONT, waiting for the option byte
    Negotiate(u8),
    Sub,
    SubIac,
}

/// Result of decoding one read
#[derive(Debug, Default, PartialEq)]
pub struct Decoded {
    /// Bytes for the display
    pub data: Vec<u8>,
    /// Bytes to send back to the server
    pub reply: Vec<u8>,
}

pub struct TelnetCodec {
    state: State,
    term: String,
    cols: u16,
    rows: u16,
    /// Options we agreed to perform (WILL sent)
    local: HashSet<u8>,
    /// Options we asked the server to perform (DO sent)
    remote: HashSet<u8>,
    /// Options already refused, so repeated requests do not loop
    refused: HashSet<u8>,
    sub: Vec<u8>,
}

impl TelnetCodec {
    pub fn new(term: &str, cols: u16, rows: u16) -> Self {
        Self {
            state: State::Data,
            term: term.to_string(),
            cols,
            rows,
            local: HashSet::new(),
            remote: HashSet::new(),
            refused: HashSet::new(),
            sub: Vec::new(),
        }
    }

    /// Opening bytes: announce NAWS and report the window size.
    pub fn handshake(&mut self) -> Vec<u8> {
        self.local.insert(OPT_NAWS);
        let mut out = vec![IAC, WILL, OPT_NAWS];
        out.extend(self.naws());
        out
    }

    /// Escape outgoing data (IAC is doubled).
    pub fn encode(data: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(data.len());
        for &byte in data {
            out.push(byte);
            if byte == IAC {
                out.push(IAC);
            }
        }
        out
    }

    fn naws(&self) -> Vec<u8> {
        let mut out = vec![IAC, SB, OPT_NAWS];
        for byte in self.cols.to_be_bytes().into_iter().chain(self.rows.to_be_bytes()) {
            out.push(byte);
            if byte == IAC {
                out.push(IAC);
            }
        }
        out.extend([IAC, SE]);
        out
    }

    pub fn decode(&mut self, input: &[u8]) -> Decoded {
        let mut decoded = Decoded::default();

        for &byte in input {
            match self.state {
                State::Data | State::DataCr => {
                    let after_cr = self.state == State::DataCr;
                    self.state = State::Data;
                    match byte {
                        IAC => self.state = State::Iac,
                        0 if after_cr => {}
                        b'\r' => {
                            decoded.data.push(byte);
                            self.state = State::DataCr;
                        }
                        _ => decoded.data.push(byte),
                    }
                }
                State::Iac => match byte {
                    IAC => {
                        decoded.data.push(IAC);
                        self.state = State::Data;
                    }
                    WILL | WONT | DO | DONT => self.state = State::Negotiate(byte),
                    SB => {
                        self.sub.clear();
                        self.state = State::Sub;
                    }
                    // NOP, GA, and the other bare commands carry no data
                    _ => self.state = State::Data,
                },
                State::Negotiate(verb) => {
                    self.negotiate(verb, byte, &mut decoded.reply);
                    self.state = State::Data;
                }
                State::Sub => match byte {
                    IAC => self.state = State::SubIac,
                    _ => {
                        if self.sub.len() < MAX_SUBNEGOTIATION {
                            self.sub.push(byte);
                        }
                    }
                },
                State::SubIac => match byte {
                    SE => {
                        self.subnegotiation(&mut decoded.reply);
                        self.state = State::Data;
                    }
                    IAC => {
                        if self.sub.len() < MAX_SUBNEGOTIATION {
                            self.sub.push(IAC);
                        }
                        self.state = State::Sub;
                    }
                    _ => self.state = State::Sub,
                },
            }
        }

        decoded
    }

    fn negotiate(&mut self, verb: u8, option: u8, reply: &mut Vec<u8>) {
        debug!("telnet: received {} {}", verb_name(verb), option);
        match verb {
            DO => match option {
                OPT_NAWS => {
                    if self.local.insert(OPT_NAWS) {
                        reply.extend([IAC, WILL, OPT_NAWS]);
                    }
                    reply.extend(self.naws());
                }
                OPT_TTYPE => {
                    if self.local.insert(OPT_TTYPE) {
                        reply.extend([IAC, WILL, OPT_TTYPE]);
                    }
                }
                _ => {
                    if self.refused.insert(option) {
                        reply.extend([IAC, WONT, option]);
                    }
                }
            },
            DONT => {
                if self.local.remove(&option) {
                    reply.extend([IAC, WONT, option]);
                }
            }
            WILL => match option {
                OPT_ECHO | OPT_SGA => {
                    if self.remote.insert(option) {
                        reply.extend([IAC, DO, option]);
                    }
                }
                _ => {
                    if self.refused.insert(option) {
                        reply.extend([IAC, DONT, option]);
                    }
                }
            },
            WONT => {
                if self.remote.remove(&option) {
                    reply.extend([IAC, DONT, option]);
                }
            }
            _ => {}
        }
    }

    fn subnegotiation(&mut self, reply: &mut Vec<u8>) {
        if self.sub.as_slice() == [OPT_TTYPE, TTYPE_SEND] {
            reply.extend([IAC, SB, OPT_TTYPE, TTYPE_IS]);
            reply.extend(self.term.as_bytes());
            reply.extend([IAC, SE]);
        }
        self.sub.clear();
    }
}

fn verb_name(verb: u8) -> &'static str {
    match verb {
        WILL => "WILL",
        WONT => "WONT",
        DO => "DO",
        DONT => "DONT",
        _ => "?",
    }
}
