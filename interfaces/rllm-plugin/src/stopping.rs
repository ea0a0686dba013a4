use std::collections::HashSet;

/// A rule evaluated after every decoded token that can end generation early.
pub trait StoppingCriteria {
    /// Returns true if generation should stop. `tokens` is the whole sequence so far, prompt included.
    fn should_stop(&self, tokens: &[u32]) -> bool;
}

/// The token ids [`StopOnTokens`] halts on when no others are given.
pub const DEFAULT_STOP_TOKENS: [u32; 5] = [50278, 50279, 50277, 1, 0];

/// Stops generation as soon as the last token is one of a set of ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopOnTokens {
    stop_ids: HashSet<u32>,
}

impl Default for StopOnTokens {
    fn default() -> Self {
        Self::new(DEFAULT_STOP_TOKENS)
    }
}

impl StopOnTokens {
    /// Create a rule that stops on any of the given token ids.
    pub fn new(stop_ids: impl IntoIterator<Item = u32>) -> Self {
        Self {
            stop_ids: stop_ids.into_iter().collect(),
        }
    }

    /// Also stop on `token`.
    pub fn with_token(mut self, token: u32) -> Self {
        self.stop_ids.insert(token);
        self
    }

    /// The ids this rule stops on.
    pub fn stop_ids(&self) -> &HashSet<u32> {
        &self.stop_ids
    }
}

impl StoppingCriteria for StopOnTokens {
    fn should_stop(&self, tokens: &[u32]) -> bool {
        tokens
            .last()
            .is_some_and(|token| self.stop_ids.contains(token))
    }
}

/// A list of stopping rules. Generation stops when any of them fires.
#[derive(Default)]
pub struct StoppingCriteriaList {
    criteria: Vec<Box<dyn StoppingCriteria + Send + Sync>>,
}

impl StoppingCriteriaList {
    /// Create an empty list, which never stops generation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rule to the list.
    pub fn with(mut self, criteria: impl StoppingCriteria + Send + Sync + 'static) -> Self {
        self.criteria.push(Box::new(criteria));
        self
    }

    /// The number of rules in the list.
    pub fn len(&self) -> usize {
        self.criteria.len()
    }

    /// Check if the list has no rules.
    pub fn is_empty(&self) -> bool {
        self.criteria.is_empty()
    }
}

impl std::fmt::Debug for StoppingCriteriaList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoppingCriteriaList")
            .field("len", &self.criteria.len())
            .finish()
    }
}

impl StoppingCriteria for StoppingCriteriaList {
    fn should_stop(&self, tokens: &[u32]) -> bool {
        self.criteria
            .iter()
            .any(|criteria| criteria.should_stop(tokens))
    }
}

impl<F: Fn(&[u32]) -> bool> StoppingCriteria for F {
    fn should_stop(&self, tokens: &[u32]) -> bool {
        self(tokens)
    }
}

#[test]
fn stops_only_on_the_last_token() {
    let rule = StopOnTokens::new([7]);
    assert!(rule.should_stop(&[3, 4, 7]));
    assert!(!rule.should_stop(&[7, 4, 3]));
    assert!(!rule.should_stop(&[]));
}

#[test]
fn default_rule_includes_the_builtin_ids() {
    let rule = StopOnTokens::default().with_token(2);
    for id in DEFAULT_STOP_TOKENS.into_iter().chain([2]) {
        assert!(rule.should_stop(&[42, id]), "{id} should stop generation");
    }
    assert!(!rule.should_stop(&[42, 3]));
}

#[test]
fn list_stops_when_any_rule_fires() {
    let list = StoppingCriteriaList::new()
        .with(StopOnTokens::new([9]))
        .with(|tokens: &[u32]| tokens.len() >= 4);
    assert_eq!(list.len(), 2);
    assert!(!list.should_stop(&[1, 2]));
    assert!(list.should_stop(&[1, 9]));
    assert!(list.should_stop(&[1, 2, 3, 4]));
    assert!(!StoppingCriteriaList::new().should_stop(&[0]));
}
