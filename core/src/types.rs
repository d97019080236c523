//! Shared primitive types used across the entire economy core.

use crate::error::{SimError, SimResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Currency amount in micros (1 display unit = 1_000_000 micros).
pub type Micros = i64;

/// Share quantity in units (1 display share = 10_000 units).
pub type Units = i64;

/// The economy epoch every row is scoped to.
pub type SeasonId = i64;

/// Opaque player identifier issued by the auth collaborator.
pub type UserId = String;

pub type BusinessId = i64;
pub type StockId = i64;

/// Generates `as_str` / `FromStr` / `Display` for a string-backed enum.
/// Parsing trims and lowercases, matching how the API layer normalises input.
macro_rules! string_enum {
    ($name:ident, $what:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl FromStr for $name {
            type Err = SimError;

            fn from_str(s: &str) -> SimResult<Self> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($text => Ok(Self::$variant),)+
                    other => Err(SimError::Invalid(format!(
                        concat!($what, " must be one of: {}; got '{}'"),
                        [$($text),+].join(", "),
                        other
                    ))),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Buy,
    Sell,
}

string_enum!(Side, "side", { Buy => "buy", Sell => "sell" });

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Private,
    Public,
}

string_enum!(Visibility, "visibility", { Private => "private", Public => "public" });

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Aggressive,
    Balanced,
    Defensive,
}

string_enum!(Strategy, "strategy", {
    Aggressive => "aggressive",
    Balanced => "balanced",
    Defensive => "defensive",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpgradeKind {
    Marketing,
    Rd,
    Automation,
    Compliance,
}

string_enum!(UpgradeKind, "upgrade", {
    Marketing => "marketing",
    Rd => "rd",
    Automation => "automation",
    Compliance => "compliance",
});

impl UpgradeKind {
    /// Column holding this upgrade's level on the business row.
    pub fn column(&self) -> &'static str {
        match self {
            Self::Marketing => "marketing_level",
            Self::Rd => "rd_level",
            Self::Automation => "automation_level",
            Self::Compliance => "compliance_level",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanStatus {
    Open,
    Repaid,
    SoldOff,
}

string_enum!(LoanStatus, "loan status", {
    Open => "open",
    Repaid => "repaid",
    SoldOff => "sold_off",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Regime {
    Bull,
    Neutral,
    Bear,
}

string_enum!(Regime, "regime", { Bull => "bull", Neutral => "neutral", Bear => "bear" });

impl Regime {
    /// Per-tick log-return bias.
    pub fn drift(&self) -> f64 {
        match self {
            Self::Bull => 0.0085,
            Self::Bear => -0.0085,
            Self::Neutral => 0.0,
        }
    }

    /// Map a uniform draw onto a regime (roughly a third each).
    pub fn from_draw(u: f64) -> Self {
        if u < 0.33 {
            Self::Bear
        } else if u < 0.66 {
            Self::Neutral
        } else {
            Self::Bull
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MachineType {
    AssemblyLine,
    RoboticsCell,
    CloudCluster,
    BioReactor,
    QuantumRig,
}

string_enum!(MachineType, "machine type", {
    AssemblyLine => "assembly_line",
    RoboticsCell => "robotics_cell",
    CloudCluster => "cloud_cluster",
    BioReactor => "bio_reactor",
    QuantumRig => "quantum_rig",
});

/// Catalog entry for a level-1 machine. Amounts are display units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MachineSpec {
    pub cost: i64,
    pub output: i64,
    pub upkeep: i64,
    pub reliability_bps: i64,
}

impl MachineType {
    pub const ALL: [MachineType; 5] = [
        Self::AssemblyLine,
        Self::RoboticsCell,
        Self::CloudCluster,
        Self::BioReactor,
        Self::QuantumRig,
    ];

    pub fn spec(&self) -> MachineSpec {
        let (cost, output, upkeep, reliability_bps) = match self {
            Self::AssemblyLine => (6_500, 70, 12, 9_450),
            Self::RoboticsCell => (12_500, 155, 28, 9_300),
            Self::CloudCluster => (18_000, 220, 42, 9_250),
            Self::BioReactor => (25_000, 330, 66, 9_100),
            Self::QuantumRig => (40_000, 530, 105, 8_900),
        };
        MachineSpec { cost, output, upkeep, reliability_bps }
    }
}

/// The acting player and the season the call is scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor<'a> {
    pub season_id: SeasonId,
    pub user_id: &'a str,
}

impl<'a> Actor<'a> {
    pub fn new(season_id: SeasonId, user_id: &'a str) -> Self {
        Self { season_id, user_id }
    }
}
