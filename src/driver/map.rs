//! Dungeon level graph scraped from the status line.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Per-level bookkeeping
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelInfo {
    pub visits: u32,
}

/// Levels the player has been on and the moves between them
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelMap {
    levels: BTreeMap<u32, LevelInfo>,
    edges: BTreeSet<(u32, u32)>,
    current: Option<u32>,
}

impl LevelMap {
    /// Record that the player is on `level`. Returns false when nothing
    /// changed (still on the same level).
    pub fn visit(&mut self, level: u32) -> bool {
        if self.current == Some(level) {
            return false;
        }
        if let Some(previous) = self.current {
            self.edges.insert((previous.min(level), previous.max(level)));
        }
        self.levels.entry(level).or_default().visits += 1;
        self.current = Some(level);
        true
    }

    #[cfg(test)]
    pub fn current(&self) -> Option<u32> {
        self.current
    }

    #[cfg(test)]
    pub fn level(&self, level: u32) -> Option<LevelInfo> {
        self.levels.get(&level).copied()
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Levels directly connected to `level`, ascending
    pub fn neighbours(&self, level: u32) -> Vec<u32> {
        self.edges
            .iter()
            .filter_map(|&(a, b)| match (a == level, b == level) {
                (true, _) => Some(b),
                (_, true) => Some(a),
                _ => None,
            })
            .collect()
    }

    /// One text line per level, shallowest first; `@` marks the current one.
    pub fn lines(&self) -> Vec<String> {
        if self.levels.is_empty() {
            return vec!["No levels visited yet".to_string()];
        }

        self.levels
            .iter()
            .map(|(&level, info)| {
                let marker = if self.current == Some(level) { '@' } else { ' ' };
                let links: Vec<String> =
                    self.neighbours(level).iter().map(u32::to_string).collect();
                let links = if links.is_empty() {
                    "-".to_string()
                } else {
                    links.join(", ")
                };
                format!(
                    "{} Dlvl {:>2}  visits {:>3}  to {}",
                    marker, level, info.visits, links
                )
            })
            .collect()
    }
}

/// Extract `N` from a `Dlvl:N` status field.
pub fn parse_dlvl(line: &str) -> Option<u32> {
    let start = line.find("Dlvl:")? + "Dlvl:".len();
    let digits: String = line[start..]
        .trim_start()
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visit_builds_graph() {
        let mut map = LevelMap::default();
        assert!(map.visit(1));
        assert!(!map.visit(1));
        assert!(map.visit(2));
        assert!(map.visit(3));
        assert!(map.visit(2));

        assert_eq!(map.current(), Some(2));
        assert_eq!(map.level(2).map(|l| l.visits), Some(2));
        assert_eq!(map.neighbours(2), vec![1, 3]);
        assert_eq!(map.neighbours(1), vec![2]);
        assert_eq!(map.len(), 3);
    }

    #[test]
    fn test_lines() {
        let mut map = LevelMap::default();
        assert_eq!(map.lines(), vec!["No levels visited yet"]);

        map.visit(1);
        map.visit(2);
        let lines = map.lines();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("  Dlvl  1"));
        assert!(lines[1].starts_with("@ Dlvl  2"));
        assert!(lines[1].ends_with("to 1"));
    }

    #[test]
    fn test_parse_dlvl() {
        assert_eq!(
            parse_dlvl("Dlvl:3 $:12 HP:14(14) Pw:5(5) AC:6 Xp:1/0 T:231"),
            Some(3)
        );
        assert_eq!(parse_dlvl("Dlvl: 12 $:0"), Some(12));
        assert_eq!(parse_dlvl("Agent the Stripling St:16"), None);
        assert_eq!(parse_dlvl("Dlvl:"), None);
    }

    #[test]
    fn test_json_keeps_graph() {
        let mut map = LevelMap::default();
        map.visit(1);
        map.visit(4);
        let json = serde_json::to_string(&map).unwrap();
        let back: LevelMap = serde_json::from_str(&json).unwrap();
        assert_eq!(back, map);
    }
}
