use regex::Regex;
use std::collections::HashMap;
use tracing::warn;

use crate::config::conditions::{
    Condition, DependencyFilter, FileChangeFilter, HeuristicFilter, PathFilter, Scope,
};
use crate::engine::facts::Fact;

/// Evaluates conditions against a fact list.
///
/// Evaluation is side-effect free apart from the regex cache, so the order
/// in which children of `all`/`any` are visited never changes the result.
pub struct ConditionEvaluator {
    /// Compiled regex cache; `None` marks a pattern that failed to compile
    regex_cache: HashMap<String, Option<Regex>>,
}

impl ConditionEvaluator {
    pub fn new() -> Self {
        Self {
            regex_cache: HashMap::new(),
        }
    }

    /// Does the condition hold over the fact list
    pub fn evaluate(&mut self, condition: &Condition, facts: &[Fact], scope: Option<&Scope>) -> bool {
        match condition {
            Condition::All { conditions } => conditions
                .iter()
                .all(|child| self.evaluate(child, facts, scope)),
            Condition::Any { conditions } => conditions
                .iter()
                .any(|child| self.evaluate(child, facts, scope)),
            Condition::Not { condition } => !self.evaluate(condition, facts, scope),
            leaf => facts
                .iter()
                .any(|fact| self.leaf_matches_fact(leaf, fact, scope)),
        }
    }

    /// Every fact matched by a leaf condition, in fact order.
    ///
    /// Returns `None` for combinators, which have no per-fact target.
    pub fn matching_facts<'f>(
        &mut self,
        condition: &Condition,
        facts: &'f [Fact],
        scope: Option<&Scope>,
    ) -> Option<Vec<&'f Fact>> {
        if !condition.is_leaf() {
            return None;
        }

        Some(
            facts
                .iter()
                .filter(|fact| self.leaf_matches_fact(condition, fact, scope))
                .collect(),
        )
    }

    fn leaf_matches_fact(&mut self, condition: &Condition, fact: &Fact, scope: Option<&Scope>) -> bool {
        match (condition, fact) {
            (Condition::FileChange { filter }, Fact::FileChange { path, change_type, .. }) => {
                file_change_matches(filter, path, *change_type)
            }
            (
                Condition::FileContent {
                    contains,
                    regex,
                    filter,
                },
                Fact::FileContent { path, content, .. },
            ) => {
                matches_scope(path, scope)
                    && path_filter_matches(filter, path)
                    && contains.iter().all(|token| content.contains(token.as_str()))
                    && regex.iter().all(|pattern| self.regex_matches(pattern, content))
            }
            (Condition::Dependency { filter }, Fact::Dependency { from, to, .. }) => {
                dependency_matches(filter, from, to)
            }
            (
                Condition::Heuristic { filter },
                Fact::Heuristic {
                    rule_id,
                    code,
                    file_path,
                    ..
                },
            ) => heuristic_matches(filter, rule_id, code, file_path.as_deref()),
            _ => false,
        }
    }

    fn regex_matches(&mut self, pattern: &str, haystack: &str) -> bool {
        let compiled = self
            .regex_cache
            .entry(pattern.to_string())
            .or_insert_with(|| match Regex::new(pattern) {
                Ok(regex) => Some(regex),
                Err(e) => {
                    warn!("Invalid regex '{}' treated as no match: {}", pattern, e);
                    None
                }
            });

        compiled.as_ref().is_some_and(|regex| regex.is_match(haystack))
    }
}

impl Default for ConditionEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

/// One-shot evaluation of a condition over a fact list
pub fn condition_matches(condition: &Condition, facts: &[Fact], scope: Option<&Scope>) -> bool {
    ConditionEvaluator::new().evaluate(condition, facts, scope)
}

/// Scope check: exclude wins, an empty include list admits everything
pub fn matches_scope(path: &str, scope: Option<&Scope>) -> bool {
    let Some(scope) = scope else {
        return true;
    };

    if scope
        .exclude
        .iter()
        .any(|pattern| path.starts_with(literal_prefix(pattern)))
    {
        return false;
    }

    scope.include.is_empty()
        || scope
            .include
            .iter()
            .any(|pattern| path.starts_with(literal_prefix(pattern)))
}

/// Everything before the first `*`
pub fn literal_prefix(pattern: &str) -> &str {
    match pattern.find('*') {
        Some(index) => &pattern[..index],
        None => pattern,
    }
}

fn file_change_matches(
    filter: &FileChangeFilter,
    path: &str,
    change_type: crate::engine::facts::ChangeType,
) -> bool {
    filter
        .path_prefix
        .as_deref()
        .map_or(true, |prefix| path.starts_with(prefix))
        && filter.change_type.map_or(true, |wanted| wanted == change_type)
}

fn path_filter_matches(filter: &PathFilter, path: &str) -> bool {
    filter
        .path_prefix
        .as_deref()
        .map_or(true, |prefix| path.starts_with(prefix))
}

fn dependency_matches(filter: &DependencyFilter, from: &str, to: &str) -> bool {
    filter.from.as_deref().map_or(true, |wanted| wanted == from)
        && filter.to.as_deref().map_or(true, |wanted| wanted == to)
}

fn heuristic_matches(
    filter: &HeuristicFilter,
    rule_id: &str,
    code: &str,
    file_path: Option<&str>,
) -> bool {
    filter.rule_id.as_deref().map_or(true, |wanted| wanted == rule_id)
        && filter.code.as_deref().map_or(true, |prefix| code.starts_with(prefix))
        && filter
            .path_prefix
            .as_deref()
            .map_or(true, |prefix| file_path.is_some_and(|path| path.starts_with(prefix)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::facts::ChangeType;
    use pretty_assertions::assert_eq;

    fn create_test_facts() -> Vec<Fact> {
        vec![
            Fact::FileChange {
                path: "src/domain/user.ts".to_string(),
                change_type: ChangeType::Added,
                source: "git".to_string(),
            },
            Fact::FileChange {
                path: "src/infra/db.ts".to_string(),
                change_type: ChangeType::Modified,
                source: "git".to_string(),
            },
            Fact::FileContent {
                path: "src/domain/user.ts".to_string(),
                content: "export class User {\n  // TODO(alice): validate\n  log() { console.log(this) }\n}".to_string(),
                source: "git".to_string(),
            },
            Fact::FileContent {
                path: "vendor/lib.js".to_string(),
                content: "console.log('vendored')".to_string(),
                source: "git".to_string(),
            },
            Fact::Dependency {
                from: "domain".to_string(),
                to: "infrastructure".to_string(),
                source: "import-graph".to_string(),
            },
            Fact::Heuristic {
                rule_id: "ios.force_unwrap".to_string(),
                code: "IOS001".to_string(),
                file_path: Some("App/View.swift".to_string()),
                severity: None,
                source: "swift-heuristics".to_string(),
            },
        ]
    }

    fn file_change(prefix: Option<&str>, change_type: Option<ChangeType>) -> Condition {
        Condition::FileChange {
            filter: FileChangeFilter {
                path_prefix: prefix.map(str::to_string),
                change_type,
            },
        }
    }

    fn content(contains: &[&str], regex: &[&str]) -> Condition {
        Condition::FileContent {
            contains: contains.iter().map(|s| s.to_string()).collect(),
            regex: regex.iter().map(|s| s.to_string()).collect(),
            filter: PathFilter::default(),
        }
    }

    #[test]
    fn test_file_change_prefix_and_type() {
        let facts = create_test_facts();
        assert!(condition_matches(&file_change(Some("src/domain/"), Some(ChangeType::Added)), &facts, None));
        assert!(!condition_matches(&file_change(Some("src/domain/"), Some(ChangeType::Deleted)), &facts, None));
        assert!(!condition_matches(&file_change(Some("docs/"), None), &facts, None));
        assert!(condition_matches(&file_change(None, None), &facts, None));
    }

    #[test]
    fn test_prefix_is_literal_not_glob() {
        let facts = create_test_facts();
        assert!(!condition_matches(&file_change(Some("src/*/user.ts"), None), &facts, None));
    }

    #[test]
    fn test_file_content_contains_and_regex_are_conjunctive() {
        let facts = create_test_facts();
        assert!(condition_matches(&content(&["console.log", "class User"], &[]), &facts, None));
        assert!(condition_matches(&content(&[], &[r"TODO\(\w+\)"]), &facts, None));
        assert!(!condition_matches(&content(&["console.log", "debugger"], &[]), &facts, None));
        assert!(!condition_matches(&content(&["console.log"], &[r"^import"]), &facts, None));
        // Empty lists are vacuously true for any content fact
        assert!(condition_matches(&content(&[], &[]), &facts, None));
    }

    #[test]
    fn test_file_content_respects_scope() {
        let facts = create_test_facts();
        let condition = content(&["vendored"], &[]);

        let include_src = Scope {
            include: vec!["src/**".to_string()],
            exclude: vec![],
        };
        assert!(condition_matches(&condition, &facts, None));
        assert!(!condition_matches(&condition, &facts, Some(&include_src)));
    }

    #[test]
    fn test_scope_exclude_wins_over_include() {
        let scope = Scope {
            include: vec!["src/*".to_string()],
            exclude: vec!["src/generated/*".to_string()],
        };
        assert!(matches_scope("src/app.ts", Some(&scope)));
        assert!(!matches_scope("src/generated/api.ts", Some(&scope)));
        assert!(!matches_scope("lib/app.ts", Some(&scope)));

        let exclude_only = Scope {
            include: vec![],
            exclude: vec!["dist/".to_string()],
        };
        assert!(matches_scope("anything/else.ts", Some(&exclude_only)));
        assert!(!matches_scope("dist/bundle.js", Some(&exclude_only)));
        assert!(matches_scope("dist/bundle.js", None));
    }

    #[test]
    fn test_literal_prefix() {
        assert_eq!(literal_prefix("src/**/*.ts"), "src/");
        assert_eq!(literal_prefix("*.ts"), "");
        assert_eq!(literal_prefix("docs/"), "docs/");
    }

    #[test]
    fn test_dependency_equality() {
        let facts = create_test_facts();
        let forbidden = Condition::Dependency {
            filter: DependencyFilter {
                from: Some("domain".to_string()),
                to: Some("infrastructure".to_string()),
            },
        };
        let reverse = Condition::Dependency {
            filter: DependencyFilter {
                from: Some("infrastructure".to_string()),
                to: None,
            },
        };
        assert!(condition_matches(&forbidden, &facts, None));
        assert!(!condition_matches(&reverse, &facts, None));
    }

    #[test]
    fn test_heuristic_filters() {
        let facts = create_test_facts();
        let by_code = Condition::Heuristic {
            filter: HeuristicFilter {
                code: Some("IOS".to_string()),
                ..Default::default()
            },
        };
        let wrong_path = Condition::Heuristic {
            filter: HeuristicFilter {
                rule_id: Some("ios.force_unwrap".to_string()),
                path_prefix: Some("Tests/".to_string()),
                ..Default::default()
            },
        };
        assert!(condition_matches(&by_code, &facts, None));
        assert!(!condition_matches(&wrong_path, &facts, None));
    }

    #[test]
    fn test_boolean_laws() {
        let fact_sets = vec![create_test_facts(), vec![]];
        let leaves = vec![
            file_change(Some("src/"), None),
            file_change(Some("nope/"), None),
            content(&["console.log"], &[]),
        ];

        for facts in &fact_sets {
            assert!(condition_matches(&Condition::All { conditions: vec![] }, facts, None));
            assert!(!condition_matches(&Condition::Any { conditions: vec![] }, facts, None));

            for leaf in &leaves {
                let double_not = Condition::Not {
                    condition: Box::new(Condition::Not {
                        condition: Box::new(leaf.clone()),
                    }),
                };
                assert_eq!(
                    condition_matches(&double_not, facts, None),
                    condition_matches(leaf, facts, None)
                );
            }
        }
    }

    #[test]
    fn test_combinator_order_independent() {
        let facts = create_test_facts();
        let a = file_change(Some("src/infra/"), None);
        let b = content(&["missing token"], &[]);
        let forward = Condition::Any {
            conditions: vec![a.clone(), b.clone()],
        };
        let backward = Condition::Any {
            conditions: vec![b, a],
        };
        assert_eq!(
            condition_matches(&forward, &facts, None),
            condition_matches(&backward, &facts, None)
        );
    }

    #[test]
    fn test_invalid_regex_is_no_match() {
        let facts = create_test_facts();
        let mut evaluator = ConditionEvaluator::new();
        let condition = content(&[], &["[invalid"]);
        assert!(!evaluator.evaluate(&condition, &facts, None));
        // Negated invalid regex is a match, and the cache keeps the verdict stable
        let negated = Condition::Not {
            condition: Box::new(condition),
        };
        assert!(evaluator.evaluate(&negated, &facts, None));
    }

    #[test]
    fn test_matching_facts_enumerates_leaves_only() {
        let facts = create_test_facts();
        let mut evaluator = ConditionEvaluator::new();

        let matched = evaluator
            .matching_facts(&file_change(Some("src/"), None), &facts, None)
            .unwrap();
        let paths: Vec<_> = matched.iter().filter_map(|f| f.target_path()).collect();
        assert_eq!(paths, vec!["src/domain/user.ts", "src/infra/db.ts"]);

        let composite = Condition::Not {
            condition: Box::new(file_change(None, None)),
        };
        assert!(evaluator.matching_facts(&composite, &facts, None).is_none());
    }
}
