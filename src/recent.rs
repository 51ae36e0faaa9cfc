use std::collections::HashMap;

use crate::bbox::{BBox, Ltrb};
use crate::detection::Detection;
use crate::team::{TeamId, TeamState};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LastSeen {
    pub bbox: BBox<Ltrb>,
    pub team: TeamId,
    /// Frames since the player was last tracked.
    pub age: u32,
}

/// Where each player was last seen. Not consulted by tracking or
/// classification; kept for consumers that smooth over short gaps.
#[derive(Debug, Clone)]
pub struct RecentPlayers {
    max_age: u32,
    entries: HashMap<u32, LastSeen>,
}

impl RecentPlayers {
    pub fn new(max_age: u32) -> Self {
        Self {
            max_age,
            entries: HashMap::new(),
        }
    }

    pub fn update(&mut self, players: &[Detection], teams: &TeamState) {
        for entry in self.entries.values_mut() {
            entry.age += 1;
        }

        for det in players {
            if let Some(id) = det.track_id {
                self.entries.insert(
                    id,
                    LastSeen {
                        bbox: det.bbox,
                        team: teams.team_of(id),
                        age: 0,
                    },
                );
            }
        }

        let max_age = self.max_age;
        self.entries.retain(|_, e| e.age <= max_age);
    }

    #[inline]
    pub fn get(&self, track_id: u32) -> Option<&LastSeen> {
        self.entries.get(&track_id)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::EntityClass;

    #[test]
    fn entries_age_out() {
        let mut recent = RecentPlayers::new(20);
        let teams = TeamState::default();
        let p = Detection::new(BBox::ltrb(0.0, 0.0, 10.0, 30.0), EntityClass::Player, 0.9)
            .with_track_id(4);

        recent.update(&[p], &teams);
        assert_eq!(recent.get(4).unwrap().age, 0);
        assert_eq!(recent.get(4).unwrap().team, TeamId::Unknown);

        for _ in 0..20 {
            recent.update(&[], &teams);
        }
        assert_eq!(recent.get(4).unwrap().age, 20);

        recent.update(&[], &teams);
        assert!(recent.is_empty());
    }
}
