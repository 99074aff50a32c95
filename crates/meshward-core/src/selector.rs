use crate::error::{CoreError, Result};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, LabelSelectorRequirement};
use std::collections::BTreeMap;

/// Evaluate an optional label selector against a label set
///
/// An absent selector matches nothing while an empty one matches everything.
/// Both `matchLabels` and `matchExpressions` must hold.
pub fn selector_matches(
    selector: Option<&LabelSelector>,
    labels: &BTreeMap<String, String>,
) -> Result<bool> {
    let Some(selector) = selector else {
        return Ok(false);
    };

    if let Some(match_labels) = &selector.match_labels {
        for (key, value) in match_labels {
            if labels.get(key) != Some(value) {
                return Ok(false);
            }
        }
    }

    for req in selector.match_expressions.iter().flatten() {
        if !requirement_matches(req, labels)? {
            return Ok(false);
        }
    }

    Ok(true)
}

/// Like [`selector_matches`], except an absent selector matches everything
pub fn selector_matches_or_all(
    selector: Option<&LabelSelector>,
    labels: &BTreeMap<String, String>,
) -> Result<bool> {
    match selector {
        Some(_) => selector_matches(selector, labels),
        None => Ok(true),
    }
}

fn requirement_matches(
    req: &LabelSelectorRequirement,
    labels: &BTreeMap<String, String>,
) -> Result<bool> {
    let value = labels.get(&req.key).map(String::as_str);
    let values = req.values.as_deref().unwrap_or_default();

    match req.operator.as_str() {
        "In" | "NotIn" if values.is_empty() => Err(CoreError::invalid_selector(format!(
            "operator {} on key {} requires at least one value",
            req.operator, req.key
        ))),
        "In" => Ok(value.is_some_and(|v| values.iter().any(|req| req == v))),
        "NotIn" => Ok(value.is_none_or(|v| !values.iter().any(|req| req == v))),
        "Exists" => Ok(value.is_some()),
        "DoesNotExist" => Ok(value.is_none()),
        other => Err(CoreError::invalid_selector(format!(
            "unknown operator {} on key {}",
            other, req.key
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn expr(key: &str, op: &str, values: &[&str]) -> LabelSelectorRequirement {
        LabelSelectorRequirement {
            key: key.to_string(),
            operator: op.to_string(),
            values: Some(values.iter().map(|v| v.to_string()).collect()),
        }
    }

    #[test]
    fn test_nil_and_empty_selectors() {
        let ns = labels(&[]);
        assert!(!selector_matches(None, &ns).unwrap());
        assert!(selector_matches(Some(&LabelSelector::default()), &ns).unwrap());
        assert!(selector_matches_or_all(None, &ns).unwrap());
    }

    #[test]
    fn test_match_labels() {
        let selector = LabelSelector {
            match_labels: Some(labels(&[("mesh", "global")])),
            ..Default::default()
        };
        assert!(selector_matches(Some(&selector), &labels(&[("mesh", "global"), ("x", "y")])).unwrap());
        assert!(!selector_matches(Some(&selector), &labels(&[("mesh", "other")])).unwrap());
        assert!(!selector_matches(Some(&selector), &labels(&[])).unwrap());
    }

    #[test]
    fn test_match_expressions() {
        let selector = LabelSelector {
            match_expressions: Some(vec![
                expr("tier", "In", &["web", "api"]),
                expr("legacy", "DoesNotExist", &[]),
            ]),
            ..Default::default()
        };
        assert!(selector_matches(Some(&selector), &labels(&[("tier", "api")])).unwrap());
        assert!(!selector_matches(Some(&selector), &labels(&[("tier", "db")])).unwrap());
        assert!(!selector_matches(
            Some(&selector),
            &labels(&[("tier", "web"), ("legacy", "true")])
        )
        .unwrap());

        let selector = LabelSelector {
            match_expressions: Some(vec![
                expr("env", "NotIn", &["prod"]),
                expr("team", "Exists", &[]),
            ]),
            ..Default::default()
        };
        assert!(selector_matches(Some(&selector), &labels(&[("team", "a")])).unwrap());
        assert!(!selector_matches(Some(&selector), &labels(&[("team", "a"), ("env", "prod")])).unwrap());
    }

    #[test]
    fn test_invalid_selector() {
        let selector = LabelSelector {
            match_expressions: Some(vec![expr("tier", "Like", &["web"])]),
            ..Default::default()
        };
        assert!(matches!(
            selector_matches(Some(&selector), &labels(&[])),
            Err(CoreError::InvalidSelector { .. })
        ));

        let selector = LabelSelector {
            match_expressions: Some(vec![expr("tier", "In", &[])]),
            ..Default::default()
        };
        assert!(selector_matches(Some(&selector), &labels(&[])).is_err());
    }
}
