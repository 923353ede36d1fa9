//! Opaque strategy-specific call parameters.

use serde::{Deserialize, Serialize};

/// Pass-through payload for positions and child investables.
///
/// The accounting engine never looks inside `Bytes`; a portfolio only splits a
/// `PerChild` list so that child `i` receives entry `i`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Params {
    #[default]
    None,
    Bytes(Vec<u8>),
    PerChild(Vec<Params>),
}

impl Params {
    pub fn bytes(data: impl Into<Vec<u8>>) -> Self {
        Params::Bytes(data.into())
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Params::None)
    }

    /// Entry for child `index` of a portfolio with `child_count` children.
    ///
    /// `None` and non-list payloads fan out as `None`. A `PerChild` list must have
    /// exactly one entry per child; `Err` carries the offending length.
    pub fn for_child(&self, index: usize, child_count: usize) -> Result<Params, usize> {
        match self {
            Params::PerChild(entries) if entries.len() != child_count => Err(entries.len()),
            Params::PerChild(entries) => Ok(entries[index].clone()),
            _ => Ok(Params::None),
        }
    }
}

/// Entry `index` of a per-child params slice; an empty slice means "no params".
pub fn params_at(params: &[Params], index: usize, child_count: usize) -> Result<Params, usize> {
    if params.is_empty() {
        return Ok(Params::None);
    }
    if params.len() != child_count {
        return Err(params.len());
    }
    Ok(params[index].clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_child_splits_list() {
        let params = Params::PerChild(vec![Params::bytes([1u8]), Params::None]);
        assert_eq!(params.for_child(0, 2), Ok(Params::bytes([1u8])));
        assert_eq!(params.for_child(1, 2), Ok(Params::None));
        assert_eq!(params.for_child(0, 3), Err(2));
    }

    #[test]
    fn test_for_child_non_list_is_none() {
        assert_eq!(Params::bytes([9u8]).for_child(0, 4), Ok(Params::None));
        assert_eq!(Params::None.for_child(3, 4), Ok(Params::None));
    }

    #[test]
    fn test_params_at() {
        assert_eq!(params_at(&[], 1, 3), Ok(Params::None));
        let list = vec![Params::None, Params::bytes([7u8])];
        assert_eq!(params_at(&list, 1, 2), Ok(Params::bytes([7u8])));
        assert_eq!(params_at(&list, 0, 3), Err(2));
    }

    #[test]
    fn test_params_serialization_is_tagged() {
        let json = serde_json::to_value(Params::bytes([1u8, 2])).unwrap();
        assert_eq!(json["kind"], "bytes");
        let none = serde_json::to_value(Params::None).unwrap();
        assert_eq!(none["kind"], "none");
    }
}
