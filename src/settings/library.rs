//! The list of named parameter sets the user can choose from.
//!
//! Set 0 is always the default set. The library tracks which set is current
//! and which one was current immediately before it, so a failed switch can be
//! undone. Only one previous selection is remembered; it is not an undo stack.

use tracing::debug;

use crate::error::{AppResult, HalError};
use crate::parameters::ParameterSet;
use crate::protocol::SetSelector;

/// Named parameter sets plus the current and previous selection.
#[derive(Debug, Clone)]
pub struct ParameterLibrary {
    sets: Vec<ParameterSet>,
    current: usize,
    previous: Option<usize>,
    enabled: bool,
}

impl ParameterLibrary {
    /// Library holding only `default`, which is current.
    pub fn new(mut default: ParameterSet) -> Self {
        default.ensure_initialized_flag();
        Self {
            sets: vec![default],
            current: 0,
            previous: None,
            enabled: true,
        }
    }

    /// Number of sets, the default included.
    pub fn len(&self) -> usize {
        self.sets.len()
    }

    /// Always false; the default set cannot be removed.
    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// Set names in library order.
    pub fn names(&self) -> Vec<String> {
        self.sets.iter().map(|s| s.name().to_string()).collect()
    }

    /// The selected set.
    pub fn current(&self) -> &ParameterSet {
        &self.sets[self.current]
    }

    /// Position of the selected set; 0 is the default set.
    pub fn current_index(&self) -> usize {
        self.current
    }

    /// The set selected before the current one, until reverted to.
    pub fn previous(&self) -> Option<&ParameterSet> {
        self.previous.map(|i| &self.sets[i])
    }

    /// Resolve a selector to a position in the library.
    pub fn position(&self, selector: &SetSelector) -> AppResult<usize> {
        match selector {
            SetSelector::Index(i) if *i < self.sets.len() => Ok(*i),
            SetSelector::Name(name) => self
                .sets
                .iter()
                .position(|s| s.name() == name)
                .ok_or_else(|| HalError::ParametersNotFound(selector.to_string())),
            _ => Err(HalError::ParametersNotFound(selector.to_string())),
        }
    }

    /// Look up a set by index or name.
    pub fn get(&self, selector: &SetSelector) -> AppResult<&ParameterSet> {
        Ok(&self.sets[self.position(selector)?])
    }

    /// Append a set, renaming it if the name is taken. Returns its position.
    pub fn add(&mut self, mut set: ParameterSet) -> usize {
        let name = self.unique_name(set.name());
        if name != set.name() {
            debug!(original = %set.name(), renamed = %name, "parameter set name already in use");
            set.set_name(name);
        }
        set.ensure_initialized_flag();
        self.sets.push(set);
        self.sets.len() - 1
    }

    /// Replace the default set in place, without changing the selection.
    pub fn replace_default(&mut self, mut set: ParameterSet) {
        set.ensure_initialized_flag();
        self.sets[0] = set;
    }

    fn unique_name(&self, name: &str) -> String {
        let taken = |candidate: &str| self.sets.iter().any(|s| s.name() == candidate);
        if !taken(name) {
            return name.to_string();
        }
        (2..)
            .map(|n| format!("{name}_{n}"))
            .find(|candidate| !taken(candidate))
            .unwrap_or_else(|| name.to_string())
    }

    /// Make set `index` current. Returns false if it already was.
    pub fn select(&mut self, index: usize) -> bool {
        if index == self.current || index >= self.sets.len() {
            return false;
        }
        self.previous = Some(self.current);
        self.current = index;
        true
    }

    /// Go back to the previously selected set, forgetting it as previous.
    pub fn revert_selection(&mut self) -> Option<usize> {
        let previous = self.previous.take()?;
        self.current = previous;
        Some(previous)
    }

    /// Record `set` as `module`'s section of the current set.
    pub fn update_current(&mut self, module: &str, set: ParameterSet) {
        self.sets[self.current].set_section(module, set);
    }

    /// Record `set` as `module`'s section of the previously selected set.
    pub fn update_previous(&mut self, module: &str, set: ParameterSet) {
        if let Some(i) = self.previous {
            self.sets[i].set_section(module, set);
        }
    }

    /// Flag the current set as accepted by every module.
    pub fn mark_current_initialized(&mut self) {
        self.sets[self.current].mark_initialized();
    }

    /// Whether the user may pick or edit sets right now.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Allow or forbid user selection and editing.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters::Parameter;

    fn library() -> ParameterLibrary {
        let mut library = ParameterLibrary::new(ParameterSet::new("default"));
        library.add(ParameterSet::new("s1"));
        library.add(ParameterSet::new("s2"));
        library
    }

    #[test]
    fn sets_get_an_initialized_flag() {
        let library = library();
        assert!(library.current().contains(crate::parameters::INITIALIZED));
        assert!(!library.current().is_initialized());
    }

    #[test]
    fn duplicate_names_are_renamed() {
        let mut library = library();
        let i = library.add(ParameterSet::new("s1"));
        assert_eq!(library.names()[i], "s1_2");
    }

    #[test]
    fn selectors_resolve_by_index_and_name() {
        let library = library();
        assert_eq!(library.position(&SetSelector::from("s2")).unwrap(), 2);
        assert_eq!(library.position(&SetSelector::from(1)).unwrap(), 1);
        assert!(matches!(
            library.position(&SetSelector::from(7)),
            Err(HalError::ParametersNotFound(_))
        ));
        assert!(library.get(&SetSelector::from("missing")).is_err());
    }

    #[test]
    fn revert_goes_back_one_step_only() {
        let mut library = library();
        assert!(library.select(1));
        assert!(library.select(2));
        assert!(!library.select(2));
        assert_eq!(library.revert_selection(), Some(1));
        assert_eq!(library.current().name(), "s1");
        assert_eq!(library.revert_selection(), None);
    }

    #[test]
    fn replacing_default_keeps_selection() {
        let mut library = library();
        library.mark_current_initialized();
        library.replace_default(ParameterSet::new("lab"));
        assert_eq!(library.current_index(), 0);
        assert_eq!(library.current().name(), "lab");
        assert!(!library.current().is_initialized());
    }

    #[test]
    fn records_go_to_current_and_previous() {
        let mut library = library();
        library.select(1);
        let mut stage = ParameterSet::new("stage");
        stage.add("x_velocity", Parameter::new(2.0));
        library.update_current("stage", stage.clone());
        library.update_previous("stage", stage);
        library.mark_current_initialized();

        assert!(library.current().section("stage").is_some());
        assert!(library.previous().unwrap().section("stage").is_some());
        assert!(library.current().is_initialized());
    }
}
