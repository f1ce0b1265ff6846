// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Template file loading.
//!
//! A template file holds one template per line in the form
//! `level=<severity>,msg=<message pattern>`. Keys before `=` are ignored, so
//! `severity=warn,message=...` works as well. A bare severity (`ERROR,msg=...`) is accepted.
//! Malformed lines are skipped with a warning; they never reach the synthesizer.

use std::fs;
use std::path::Path;

use rand::Rng;
use tracing::{debug, warn};

use crate::errors::TemplateError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub severity: String,
    pub message: String,
}

/// The templates loaded from one source file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateGroup {
    source: String,
    templates: Vec<Template>,
}

impl TemplateGroup {
    #[must_use]
    pub fn new(source: impl Into<String>, templates: Vec<Template>) -> Self {
        Self {
            source: source.into(),
            templates,
        }
    }

    /// Concatenates several groups into one; the broker variant draws from every file.
    #[must_use]
    pub fn merge(groups: &[TemplateGroup]) -> Self {
        let source = groups
            .iter()
            .map(|group| group.source.as_str())
            .collect::<Vec<_>>()
            .join(",");
        let templates = groups
            .iter()
            .flat_map(|group| group.templates.iter().cloned())
            .collect();
        Self { source, templates }
    }

    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    #[must_use]
    pub fn templates(&self) -> &[Template] {
        &self.templates
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Picks a template uniformly at random.
    pub fn choose<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&Template> {
        if self.templates.is_empty() {
            return None;
        }
        self.templates.get(rng.gen_range(0..self.templates.len()))
    }
}

/// Parses one template line, returning `None` when a separator is missing.
#[must_use]
pub fn parse_template_line(line: &str) -> Option<Template> {
    let line = line.trim();
    let (head, tail) = line.split_once(',')?;

    let severity = match head.split_once('=') {
        Some((_, severity)) => severity,
        None => head,
    }
    .trim();
    let (_, message) = tail.split_once('=')?;
    let message = message.trim();

    if severity.is_empty() {
        return None;
    }

    Some(Template {
        severity: severity.to_string(),
        message: message.to_string(),
    })
}

/// Parses the content of one template file.
#[must_use]
pub fn parse_templates(source: &str, content: &str) -> TemplateGroup {
    let mut templates = Vec::new();
    for (number, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match parse_template_line(line) {
            Some(template) => templates.push(template),
            None => warn!(
                "Skipping malformed template at {}:{}: {:?}",
                source,
                number + 1,
                line
            ),
        }
    }
    TemplateGroup::new(source, templates)
}

/// Loads one [`TemplateGroup`] per file. Files without a usable line are dropped.
pub fn load_templates<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<TemplateGroup>, TemplateError> {
    let mut groups = Vec::with_capacity(paths.len());
    for path in paths {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| TemplateError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let group = parse_templates(&path.display().to_string(), &content);
        if group.is_empty() {
            warn!("No log templates found in {}", path.display());
            continue;
        }
        debug!("Loaded {} templates from {}", group.len(), path.display());
        groups.push(group);
    }

    if groups.is_empty() {
        return Err(TemplateError::Empty(paths.len()));
    }
    Ok(groups)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;
    use std::io::Write;
    use tracing_test::traced_test;

    #[test]
    fn test_parse_template_line() {
        let template = parse_template_line("level=ERROR, msg=Connection refused from $IP")
            .expect("line should parse");
        assert_eq!(template.severity, "ERROR");
        assert_eq!(template.message, "Connection refused from $IP");
    }

    #[test]
    fn test_parse_template_line_keeps_equals_in_message() {
        let template =
            parse_template_line("level=info,msg=user=bob port=$INT").expect("line should parse");
        assert_eq!(template.severity, "info");
        assert_eq!(template.message, "user=bob port=$INT");
    }

    #[test]
    fn test_parse_template_line_bare_severity() {
        let template =
            parse_template_line("ERROR,msg=conn failed from $IP").expect("line should parse");
        assert_eq!(template.severity, "ERROR");
        assert_eq!(template.message, "conn failed from $IP");
    }

    #[test]
    fn test_parse_template_line_rejects_malformed() {
        assert_eq!(parse_template_line("level=ERROR msg=no comma"), None);
        assert_eq!(parse_template_line("level=ERROR,no equals"), None);
        assert_eq!(parse_template_line("level=,msg=empty severity"), None);
    }

    #[test]
    #[traced_test]
    fn test_parse_templates_skips_bad_lines() {
        let content = "level=INFO,msg=started\n\nnot a template\nlevel=WARN,msg=slow $INT ms\n";
        let group = parse_templates("app.txt", content);
        assert_eq!(group.len(), 2);
        assert_eq!(group.templates()[1].severity, "WARN");
        assert!(logs_contain("Skipping malformed template at app.txt:3"));
    }

    #[test]
    fn test_choose_is_uniform_over_group() {
        let group = TemplateGroup::new(
            "t",
            vec![
                Template {
                    severity: "INFO".into(),
                    message: "a".into(),
                },
                Template {
                    severity: "WARN".into(),
                    message: "b".into(),
                },
            ],
        );
        let mut rng = SmallRng::seed_from_u64(7);
        let mut seen_a = 0;
        for _ in 0..1000 {
            if group.choose(&mut rng).map(|t| t.message.as_str()) == Some("a") {
                seen_a += 1;
            }
        }
        assert!((400..600).contains(&seen_a), "seen_a = {seen_a}");
        assert!(TemplateGroup::default().choose(&mut rng).is_none());
    }

    #[test]
    fn test_merge_groups() {
        let a = parse_templates("a", "level=INFO,msg=one\n");
        let b = parse_templates("b", "level=INFO,msg=two\nlevel=INFO,msg=three\n");
        let merged = TemplateGroup::merge(&[a, b]);
        assert_eq!(merged.len(), 3);
        assert_eq!(merged.source(), "a,b");
    }

    #[test]
    fn test_load_templates() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let good = dir.path().join("good.txt");
        let empty = dir.path().join("empty.txt");
        fs::File::create(&good)
            .and_then(|mut f| f.write_all(b"level=ERROR,msg=disk full on $IP\n"))
            .expect("failed to write template");
        fs::File::create(&empty)
            .and_then(|mut f| f.write_all(b"garbage\n"))
            .expect("failed to write template");

        let groups = load_templates(&[&good, &empty]).expect("templates should load");
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].templates()[0].message, "disk full on $IP");

        assert!(matches!(
            load_templates(&[&empty]),
            Err(TemplateError::Empty(1))
        ));
        assert!(matches!(
            load_templates(&[dir.path().join("missing.txt")]),
            Err(TemplateError::Read { .. })
        ));
    }
}
