//! Property tests for the transition table and request validation

mod fixtures;

use fixtures::{fast_settings, TestGateways};
use proptest::prelude::*;
use rider_state::gateways::StaticValidator;
use rider_state::lifecycle::{
    classify, rider_table, RawTransitionRequest, Stage, StateName, TransitionClass,
    TransitionOutcome,
};
use std::sync::Arc;

fn state_strategy() -> impl Strategy<Value = StateName> {
    prop_oneof![
        Just(StateName::NotWorking),
        Just(StateName::Available),
        Just(StateName::Starting),
        Just(StateName::Working),
    ]
}

#[test]
fn test_table_has_seven_legal_pairs() {
    let mut legal = 0;
    let mut validated = Vec::new();

    for from in StateName::ALL {
        for to in StateName::ALL {
            match classify(from, to) {
                TransitionClass::Illegal => {}
                TransitionClass::Validated => {
                    legal += 1;
                    validated.push((from, to));
                }
                TransitionClass::Direct => legal += 1,
            }
        }
    }

    assert_eq!(legal, 7);
    assert_eq!(rider_table().len(), 7);
    assert_eq!(validated, vec![(StateName::Starting, StateName::Working)]);
}

#[test]
fn test_self_transitions_are_illegal() {
    for state in StateName::ALL {
        assert_eq!(classify(state, state), TransitionClass::Illegal);
    }
}

proptest! {
    #[test]
    fn prop_classification_matches_rule_lookup(from in state_strategy(), to in state_strategy()) {
        let rule = rider_table()
            .rules()
            .iter()
            .find(|rule| rule.from == from && rule.to == to);

        let expected = match rule {
            None => TransitionClass::Illegal,
            Some(rule) => rule.class(),
        };
        prop_assert_eq!(classify(from, to), expected);
    }

    #[test]
    fn prop_only_working_can_be_left_for_not_working_alone(to in state_strategy()) {
        let class = classify(StateName::Working, to);
        prop_assert_eq!(class != TransitionClass::Illegal, to == StateName::NotWorking);
    }

    #[test]
    fn prop_unrecognized_state_names_are_rejected(name in "[A-Za-z ]{0,12}") {
        let recognized = StateName::ALL.iter().any(|state| state.as_str() == name);
        let result = RawTransitionRequest::new("r1", name.clone()).validate();
        prop_assert_eq!(result.is_ok(), recognized);
    }

    #[test]
    fn prop_blank_entity_ids_are_rejected(id in "[ \t]{0,6}") {
        prop_assert!(RawTransitionRequest::new(id, "Available").validate().is_err());
    }
}

#[test]
fn prop_outcome_follows_classification() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&(state_strategy(), state_strategy()), |(from, to)| {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();

            rt.block_on(async {
                let fixture = TestGateways::with_validator(Arc::new(StaticValidator::approving()));
                fixture.seed("r1", from);

                let outcome = fixture
                    .orchestrator_with(fast_settings())
                    .run(RawTransitionRequest::new("r1", to.as_str()))
                    .await;

                match classify(from, to) {
                    TransitionClass::Illegal => {
                        prop_assert_eq!(outcome.stage(), Some(Stage::Classify));
                        prop_assert_eq!(fixture.state_of("r1"), Some(from));
                        prop_assert_eq!(fixture.dead_letter.envelopes().len(), 1);
                    }
                    class => {
                        prop_assert_eq!(
                            outcome,
                            TransitionOutcome::Succeeded {
                                entity_id: "r1".to_string(),
                                from_state: from,
                                to_state: to,
                            }
                        );
                        prop_assert_eq!(fixture.state_of("r1"), Some(to));
                        let expected_events = usize::from(class == TransitionClass::Direct);
                        prop_assert_eq!(fixture.notifier.events().len(), expected_events);
                        prop_assert!(fixture.dead_letter.envelopes().is_empty());
                    }
                }
                Ok(())
            })
        })
        .unwrap();
}
