//! Deterministic hiring pool using curated name lists.
//!
//! The pool is a pure function of its size: the same season always offers
//! the same candidates, with no randomness involved.

use crate::{money::stonky, types::Micros};

/// A candidate as seeded into a season's pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateSeed {
    pub full_name: String,
    pub role: &'static str,
    pub trait_name: &'static str,
    pub hire_cost_micros: Micros,
    pub revenue_per_tick_micros: Micros,
    pub risk_bps: i64,
}

pub struct CandidatePool;

impl CandidatePool {
    /// The first `size` candidates of the fixed pool.
    pub fn generate(size: usize) -> Vec<CandidateSeed> {
        (0..size).map(Self::candidate).collect()
    }

    fn candidate(i: usize) -> CandidateSeed {
        let first = Self::first_names();
        let last = Self::last_names();
        let roles = Self::roles();
        let traits = Self::traits();

        let role = roles[i % roles.len()];
        let mut revenue = 28 + (i as i64 % 12) * 7;
        let cost = 420 + (i as i64 % 15) * 95;
        let mut risk = 12 + (i as i64 * 9) % 88;
        match role {
            "growth" | "sales" => {
                risk += 20;
                revenue += 10;
            }
            "finance" | "legal" => risk -= 8,
            _ => {}
        }

        CandidateSeed {
            full_name: format!("{} {}", first[i % first.len()], last[(i * 7) % last.len()]),
            role,
            trait_name: traits[(i * 3) % traits.len()],
            hire_cost_micros: stonky(cost),
            revenue_per_tick_micros: stonky(revenue),
            risk_bps: risk,
        }
    }

    fn first_names() -> &'static [&'static str] {
        &[
            "Maya", "Arun", "Iris", "Noah", "Tara", "Kian", "Lea", "Ravi", "Nora", "Evan",
            "Zara", "Omar", "Lina", "Kade", "Ava", "Dion", "Sana", "Milo", "Rhea", "Theo",
        ]
    }

    fn last_names() -> &'static [&'static str] {
        &[
            "Lee", "Vale", "Knox", "Pike", "Sol", "Moss", "Rowe", "Jain", "Park", "Reid",
            "Cross", "Quill", "Stone", "Wren", "Bose", "Cho", "Kent", "Ford", "Hart", "Yoon",
        ]
    }

    fn roles() -> &'static [&'static str] {
        &[
            "operator", "engineer", "sales", "finance", "product", "ops", "growth", "legal",
            "design", "analyst",
        ]
    }

    fn traits() -> &'static [&'static str] {
        &[
            "disciplined", "innovative", "charismatic", "conservative", "visionary",
            "resilient", "strategic", "meticulous", "adaptive", "ambitious",
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_is_deterministic() {
        assert_eq!(CandidatePool::generate(24), CandidatePool::generate(24));
    }

    #[test]
    fn first_candidates_match_fixed_lists() {
        let pool = CandidatePool::generate(3);
        assert_eq!(pool[0].full_name, "Maya Lee");
        assert_eq!(pool[0].role, "operator");
        assert_eq!(pool[0].risk_bps, 12);
        assert_eq!(pool[1].full_name, "Arun Jain");
        // sales adds risk and revenue
        assert_eq!(pool[2].role, "sales");
        assert_eq!(pool[2].risk_bps, 12 + 18 + 20);
        assert_eq!(pool[2].revenue_per_tick_micros, stonky(28 + 14 + 10));
    }
}
