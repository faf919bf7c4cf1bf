// Transition legality table and classifier

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;
use thiserror::Error;

use super::types::{StateName, Stage};

/// How a `(current, next)` pair is handled by the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionClass {
    /// Legal, no external check
    Direct,
    /// Legal once the precondition validator approves
    Validated,
    /// Not in the table
    Illegal,
}

/// Side-effecting steps run after classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStep {
    Precondition,
    Persist,
    Notify,
}

impl WorkflowStep {
    pub fn stage(&self) -> Stage {
        match self {
            WorkflowStep::Precondition => Stage::Precondition,
            WorkflowStep::Persist => Stage::Persist,
            WorkflowStep::Notify => Stage::Notify,
        }
    }
}

const VALIDATED_STEPS: &[WorkflowStep] = &[WorkflowStep::Precondition, WorkflowStep::Persist];
const DIRECT_STEPS: &[WorkflowStep] = &[WorkflowStep::Persist, WorkflowStep::Notify];

impl TransitionClass {
    /// Ordered step list for this class.
    ///
    /// The validated path does not notify after persisting; only direct
    /// transitions emit a change event.
    pub fn steps(&self) -> &'static [WorkflowStep] {
        match self {
            TransitionClass::Validated => VALIDATED_STEPS,
            TransitionClass::Direct => DIRECT_STEPS,
            TransitionClass::Illegal => &[],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionClass::Direct => "direct",
            TransitionClass::Validated => "validated",
            TransitionClass::Illegal => "illegal",
        }
    }
}

impl fmt::Display for TransitionClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One legal transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRule {
    pub from: StateName,
    pub to: StateName,
    pub requires_precondition: bool,
}

impl TransitionRule {
    pub const fn direct(from: StateName, to: StateName) -> Self {
        Self {
            from,
            to,
            requires_precondition: false,
        }
    }

    pub const fn validated(from: StateName, to: StateName) -> Self {
        Self {
            from,
            to,
            requires_precondition: true,
        }
    }

    pub fn class(&self) -> TransitionClass {
        if self.requires_precondition {
            TransitionClass::Validated
        } else {
            TransitionClass::Direct
        }
    }
}

/// Rule set for riders
pub const RIDER_RULES: &[TransitionRule] = &[
    TransitionRule::validated(StateName::Starting, StateName::Working),
    TransitionRule::direct(StateName::NotWorking, StateName::Available),
    TransitionRule::direct(StateName::NotWorking, StateName::Starting),
    TransitionRule::direct(StateName::Available, StateName::NotWorking),
    TransitionRule::direct(StateName::Available, StateName::Starting),
    TransitionRule::direct(StateName::Starting, StateName::NotWorking),
    TransitionRule::direct(StateName::Working, StateName::NotWorking),
];

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TableError {
    #[error("duplicate transition rule {from} -> {to}")]
    DuplicateRule { from: StateName, to: StateName },
}

/// Immutable lookup of legal transitions
#[derive(Debug, Clone)]
pub struct TransitionTable {
    rules: Vec<TransitionRule>,
    index: HashMap<(StateName, StateName), TransitionClass>,
}

impl TransitionTable {
    /// Build a table, rejecting duplicate `(from, to)` pairs
    pub fn new(rules: impl IntoIterator<Item = TransitionRule>) -> Result<Self, TableError> {
        let mut ordered = Vec::new();
        let mut index = HashMap::new();

        for rule in rules {
            if index.insert((rule.from, rule.to), rule.class()).is_some() {
                return Err(TableError::DuplicateRule {
                    from: rule.from,
                    to: rule.to,
                });
            }
            ordered.push(rule);
        }

        Ok(Self {
            rules: ordered,
            index,
        })
    }

    /// Classify a requested transition. Pure.
    pub fn classify(&self, current: StateName, next: StateName) -> TransitionClass {
        self.index
            .get(&(current, next))
            .copied()
            .unwrap_or(TransitionClass::Illegal)
    }

    pub fn rules(&self) -> &[TransitionRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

static RIDER_TABLE: LazyLock<TransitionTable> = LazyLock::new(|| {
    TransitionTable::new(RIDER_RULES.iter().copied())
        .expect("RIDER_RULES contains no duplicate pairs")
});

/// Process-wide rider transition table
pub fn rider_table() -> &'static TransitionTable {
    &RIDER_TABLE
}

/// Classify against the rider table
pub fn classify(current: StateName, next: StateName) -> TransitionClass {
    rider_table().classify(current, next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use StateName::*;

    #[test]
    fn test_validated_rule() {
        assert_eq!(classify(Starting, Working), TransitionClass::Validated);
    }

    #[test]
    fn test_direct_rules() {
        for (from, to) in [
            (NotWorking, Available),
            (NotWorking, Starting),
            (Available, NotWorking),
            (Available, Starting),
            (Starting, NotWorking),
            (Working, NotWorking),
        ] {
            assert_eq!(classify(from, to), TransitionClass::Direct, "{from} -> {to}");
        }
    }

    #[test]
    fn test_everything_else_is_illegal() {
        let legal = rider_table().len();
        let illegal = StateName::ALL
            .iter()
            .flat_map(|from| StateName::ALL.iter().map(move |to| (*from, *to)))
            .filter(|(from, to)| classify(*from, *to) == TransitionClass::Illegal)
            .count();

        assert_eq!(legal, 7);
        assert_eq!(illegal, 16 - legal);
        for state in StateName::ALL {
            assert_eq!(classify(state, state), TransitionClass::Illegal);
        }
        assert_eq!(classify(Working, Available), TransitionClass::Illegal);
        assert_eq!(classify(Available, Working), TransitionClass::Illegal);
    }

    #[test]
    fn test_duplicate_rules_are_rejected() {
        let result = TransitionTable::new([
            TransitionRule::direct(Available, Starting),
            TransitionRule::validated(Available, Starting),
        ]);

        assert_eq!(
            result.unwrap_err(),
            TableError::DuplicateRule {
                from: Available,
                to: Starting
            }
        );
    }

    #[test]
    fn test_step_lists_per_class() {
        assert_eq!(
            TransitionClass::Validated.steps(),
            &[WorkflowStep::Precondition, WorkflowStep::Persist]
        );
        assert_eq!(
            TransitionClass::Direct.steps(),
            &[WorkflowStep::Persist, WorkflowStep::Notify]
        );
        assert!(TransitionClass::Illegal.steps().is_empty());
    }
}
