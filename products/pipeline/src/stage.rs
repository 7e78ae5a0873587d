//! Sales stages and the rules for moving between them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{TransitionError, ValidationError};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum Stage {
    #[serde(rename = "Prospecting")]
    Prospecting,
    #[serde(rename = "Qualification")]
    Qualification,
    #[serde(rename = "Proposal")]
    Proposal,
    #[serde(rename = "Negotiation")]
    Negotiation,
    #[serde(rename = "Closed Won")]
    ClosedWon,
    #[serde(rename = "Closed Lost")]
    ClosedLost,
}

impl Stage {
    /// Board order: the forward sequence followed by Closed Lost.
    pub const ALL: [Stage; 6] = [
        Stage::Prospecting,
        Stage::Qualification,
        Stage::Proposal,
        Stage::Negotiation,
        Stage::ClosedWon,
        Stage::ClosedLost,
    ];

    /// The advance path. Closed Lost is reachable only through [`Stage::check_transition`].
    pub const FORWARD: [Stage; 5] = [
        Stage::Prospecting,
        Stage::Qualification,
        Stage::Proposal,
        Stage::Negotiation,
        Stage::ClosedWon,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Stage::Prospecting => "Prospecting",
            Stage::Qualification => "Qualification",
            Stage::Proposal => "Proposal",
            Stage::Negotiation => "Negotiation",
            Stage::ClosedWon => "Closed Won",
            Stage::ClosedLost => "Closed Lost",
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            Stage::Prospecting => "PROSPECTING",
            Stage::Qualification => "QUALIFICATION",
            Stage::Proposal => "PROPOSAL",
            Stage::Negotiation => "NEGOTIATION",
            Stage::ClosedWon => "CLOSED_WON",
            Stage::ClosedLost => "CLOSED_LOST",
        }
    }

    pub fn sort_order(self) -> u8 {
        match self {
            Stage::Prospecting => 10,
            Stage::Qualification => 20,
            Stage::Proposal => 30,
            Stage::Negotiation => 40,
            Stage::ClosedWon => 90,
            Stage::ClosedLost => 95,
        }
    }

    /// Close probability a transaction takes on when it enters this stage.
    pub fn default_probability(self) -> u8 {
        match self {
            Stage::Prospecting => 10,
            Stage::Qualification => 25,
            Stage::Proposal => 50,
            Stage::Negotiation => 75,
            Stage::ClosedWon => 100,
            Stage::ClosedLost => 0,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::ClosedWon | Stage::ClosedLost)
    }

    pub fn is_active(self) -> bool {
        !self.is_terminal()
    }

    pub fn is_won(self) -> bool {
        self == Stage::ClosedWon
    }

    pub fn is_lost(self) -> bool {
        self == Stage::ClosedLost
    }

    /// Next stage on the advance path, or `None` once the deal is closed.
    pub fn next_forward(self) -> Option<Stage> {
        match self {
            Stage::Prospecting => Some(Stage::Qualification),
            Stage::Qualification => Some(Stage::Proposal),
            Stage::Proposal => Some(Stage::Negotiation),
            Stage::Negotiation => Some(Stage::ClosedWon),
            Stage::ClosedWon | Stage::ClosedLost => None,
        }
    }

    /// Terminal stages have no outgoing edges; every other stage may move
    /// anywhere, including onto itself.
    pub fn check_transition(self, target: Stage) -> Result<(), TransitionError> {
        if self.is_terminal() {
            return Err(TransitionError::FromTerminal {
                from: self,
                to: target,
            });
        }
        Ok(())
    }
}

pub fn next_forward_stage(stage: Stage) -> Option<Stage> {
    stage.next_forward()
}

pub fn is_terminal(stage: Stage) -> bool {
    stage.is_terminal()
}

pub fn is_active(stage: Stage) -> bool {
    stage.is_active()
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Stage {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        Stage::ALL
            .into_iter()
            .find(|stage| {
                stage.label().eq_ignore_ascii_case(trimmed) || stage.key().eq_ignore_ascii_case(trimmed)
            })
            .ok_or_else(|| ValidationError::UnknownStage(value.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probability_table_matches_stage_order() {
        let probabilities: Vec<u8> = Stage::ALL.iter().map(|s| s.default_probability()).collect();
        assert_eq!(probabilities, vec![10, 25, 50, 75, 100, 0]);
    }

    #[test]
    fn forward_walk_visits_each_open_stage_once() {
        for pair in Stage::FORWARD.windows(2) {
            assert_eq!(next_forward_stage(pair[0]), Some(pair[1]));
        }
        assert_eq!(next_forward_stage(Stage::ClosedWon), None);
        assert_eq!(next_forward_stage(Stage::ClosedLost), None);
    }

    #[test]
    fn terminal_stages_reject_every_target() {
        for from in [Stage::ClosedWon, Stage::ClosedLost] {
            for to in Stage::ALL {
                assert!(from.check_transition(to).is_err(), "{from} -> {to}");
            }
        }
        assert!(Stage::Proposal.check_transition(Stage::ClosedLost).is_ok());
        assert!(Stage::Proposal.check_transition(Stage::Prospecting).is_ok());
    }

    #[test]
    fn active_is_complement_of_terminal() {
        for stage in Stage::ALL {
            assert_eq!(is_active(stage), !is_terminal(stage));
        }
    }

    #[test]
    fn parses_labels_and_keys() {
        assert_eq!("Closed Won".parse::<Stage>().unwrap(), Stage::ClosedWon);
        assert_eq!("closed lost".parse::<Stage>().unwrap(), Stage::ClosedLost);
        assert_eq!("NEGOTIATION".parse::<Stage>().unwrap(), Stage::Negotiation);
        assert_eq!(
            "Escrow".parse::<Stage>().unwrap_err(),
            ValidationError::UnknownStage("Escrow".into())
        );
    }

    #[test]
    fn serializes_as_display_label() {
        let json = serde_json::to_string(&Stage::ClosedWon).unwrap();
        assert_eq!(json, "\"Closed Won\"");
        let back: Stage = serde_json::from_str("\"Qualification\"").unwrap();
        assert_eq!(back, Stage::Qualification);
    }
}
