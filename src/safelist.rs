//! Safelist (C7): rule-based exclusion of known third-party bundles from
//! externally declared projects, spec §4.7.
//!
//! Has no direct analogue in the teacher, so it is modeled the way other
//! config-driven rule engines in the retrieval pack are: load a JSON rule
//! file, compile case-insensitive `regex`s, substitute capture groups into a
//! template.

use std::collections::HashMap;
use std::path::Path;

use log::warn;
use regex::{escape, Regex, RegexBuilder};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ExcludeToken {
    Literal(String),
    Group(usize),
}

#[derive(Debug, Deserialize)]
struct RawRule {
    #[serde(rename = "match")]
    pattern: String,
    #[serde(default)]
    exclude: Option<Vec<Vec<ExcludeToken>>>,
    #[serde(default)]
    types: Vec<String>,
}

pub struct Rule {
    pub name: String,
    regex: Regex,
    exclude_templates: Option<Vec<Vec<ExcludeToken>>>,
    pub types: Vec<String>,
}

#[derive(Default)]
pub struct Safelist {
    rules: Vec<Rule>,
}

/// Result of running the safelist over one external project's roots.
pub struct SafelistOutcome {
    pub surviving_roots: Vec<std::path::PathBuf>,
    pub injected_typings: Vec<String>,
}

impl Safelist {
    pub fn empty() -> Safelist {
        Safelist { rules: Vec::new() }
    }

    /// Parses the safelist file format of spec §6: a mapping from rule name
    /// to `{match, exclude?, types?}`.
    pub fn parse(text: &str) -> Result<Safelist, serde_json::Error> {
        let raw: HashMap<String, RawRule> = serde_json::from_str(text)?;
        let mut rules = Vec::with_capacity(raw.len());
        for (name, rule) in raw {
            let regex = match RegexBuilder::new(&rule.pattern).case_insensitive(true).build() {
                Ok(r) => r,
                Err(err) => {
                    warn!("safelist rule {:?} has an invalid match regex {:?}: {}", name, rule.pattern, err);
                    continue;
                }
            };
            rules.push(Rule { name, regex, exclude_templates: rule.exclude, types: rule.types });
        }
        // Stable order makes matching deterministic regardless of the
        // HashMap's iteration order during parse.
        rules.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(Safelist { rules })
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Applies the safelist to `roots`, mutating an external project's
    /// declaration in place per spec §4.7: for every root filename, for
    /// every matching rule, inject its typings and compute exclusion
    /// regexes; apply the union of exclusion regexes to the root list.
    pub fn apply(&self, roots: &[std::path::PathBuf]) -> SafelistOutcome {
        let mut exclusion_regexes: Vec<Regex> = Vec::new();
        let mut injected_typings: Vec<String> = Vec::new();

        for root in roots {
            let filename = root.to_string_lossy();
            for rule in &self.rules {
                let captures = match rule.regex.captures(&filename) {
                    Some(c) => c,
                    None => continue,
                };

                injected_typings.extend(rule.types.iter().cloned());

                match &rule.exclude_templates {
                    None => {
                        // No exclusions specified: exclude only the matched file itself.
                        exclusion_regexes.push(Regex::new(&escape(&filename)).expect("escaped literal is a valid regex"));
                    }
                    Some(templates) => {
                        for template in templates {
                            let mut pattern = String::new();
                            for token in template {
                                match token {
                                    ExcludeToken::Literal(text) => pattern.push_str(text),
                                    ExcludeToken::Group(index) => match captures.get(*index) {
                                        Some(m) => pattern.push_str(m.as_str()),
                                        None => {
                                            warn!(
                                                "safelist rule {:?} references capture group {} which {:?} did not produce; degrading to a literal `\\*`",
                                                rule.name, index, filename
                                            );
                                            pattern.push_str("\\*");
                                        }
                                    },
                                }
                            }
                            match RegexBuilder::new(&pattern).case_insensitive(true).build() {
                                Ok(r) => exclusion_regexes.push(r),
                                Err(err) => warn!("safelist rule {:?} produced an invalid exclusion regex {:?}: {}", rule.name, pattern, err),
                            }
                        }
                    }
                }
            }
        }

        let surviving_roots = roots
            .iter()
            .filter(|root| {
                let filename = root.to_string_lossy();
                !exclusion_regexes.iter().any(|re| re.is_match(&filename))
            })
            .cloned()
            .collect();

        SafelistOutcome { surviving_roots, injected_typings }
    }
}

pub fn is_safelist_path(path: &Path) -> bool {
    path.extension().map(|ext| ext == "json").unwrap_or(false)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn jquery_rule_excludes_matched_root_and_injects_typings() {
        let json = r#"{
            "jquery": {
                "match": "jquery.*\\.js$",
                "types": ["jquery"]
            }
        }"#;
        let safelist = Safelist::parse(json).unwrap();
        let roots = vec![PathBuf::from("lib/jquery-1.10.2.min.js")];
        let outcome = safelist.apply(&roots);
        assert!(outcome.surviving_roots.is_empty());
        assert_eq!(outcome.injected_typings, vec!["jquery".to_string()]);
    }

    #[test]
    fn exclude_template_substitutes_capture_group() {
        let json = r#"{
            "foo": {
                "match": "(.*)/vendor/foo\\.js$",
                "exclude": [["^", 1, "/vendor/"]]
            }
        }"#;
        let safelist = Safelist::parse(json).unwrap();
        let roots = vec![PathBuf::from("proj/vendor/foo.js"), PathBuf::from("proj/vendor/bar.js")];
        let outcome = safelist.apply(&roots);
        assert_eq!(outcome.surviving_roots, vec![PathBuf::from("proj/vendor/bar.js")]);
    }

    #[test]
    fn missing_capture_group_degrades_to_literal_star() {
        let json = r#"{
            "foo": {
                "match": "foo\\.js$",
                "exclude": [["bar-", 5, "-baz"]]
            }
        }"#;
        let safelist = Safelist::parse(json).unwrap();
        let roots = vec![PathBuf::from("foo.js")];
        // Should not panic, and should still produce a (degenerate) exclusion regex.
        let outcome = safelist.apply(&roots);
        assert!(outcome.surviving_roots.is_empty() || outcome.surviving_roots.len() == 1);
    }
}
