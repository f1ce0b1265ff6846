// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Record synthesis.
//!
//! A [`Synthesizer`] turns one template from a [`TemplateGroup`] into a structured record:
//! placeholders in the message are filled with random values, the severity is normalized
//! for the sink, and static (and optionally padding) tags are merged in.
//!
//! Placeholders:
//! - `$IP`: four random octets in `0..=255`, dot-joined
//! - `$INT`: a random integer in `1..=65535`
//! - `$STRING`: a random alphanumeric string (broker sink only)
//!
//! Every occurrence gets its own value.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;
use regex::{Captures, Regex};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::config::time_format::TimeFormat;
use crate::config::Config;
use crate::constants::DEFAULT_EXTRA_TAG_LENGTH;
use crate::sink::SinkKind;
use crate::templates::TemplateGroup;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeverityCase {
    Upper,
    Lower,
}

impl SeverityCase {
    #[must_use]
    pub fn apply(self, severity: &str) -> String {
        match self {
            SeverityCase::Upper => severity.trim().to_uppercase(),
            SeverityCase::Lower => severity.trim().to_lowercase(),
        }
    }
}

/// Sink-specific synthesis rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SynthesisProfile {
    pub severity_case: SeverityCase,
    /// Whether `$STRING` is a placeholder
    pub expand_strings: bool,
    pub string_length: usize,
}

impl SynthesisProfile {
    #[must_use]
    pub fn for_sink(kind: SinkKind, string_length: usize) -> Self {
        match kind {
            SinkKind::Elasticsearch => SynthesisProfile {
                severity_case: SeverityCase::Upper,
                expand_strings: false,
                string_length,
            },
            SinkKind::Kafka => SynthesisProfile {
                severity_case: SeverityCase::Lower,
                expand_strings: true,
                string_length,
            },
        }
    }
}

/// Run-wide increasing counter backing the index tag.
#[derive(Debug, Default)]
pub struct IndexCounter(AtomicU64);

impl IndexCounter {
    /// Returns the next value, starting at 1. Never returns the same value twice.
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }

    #[must_use]
    pub fn current(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Padding tags applied when large JSON records are requested.
#[derive(Debug, Clone)]
pub struct ExtraTags {
    pub tags: BTreeMap<String, String>,
    pub index_key: String,
    pub counter: Arc<IndexCounter>,
}

/// A synthesized record, as a JSON object.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    #[must_use]
    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedRecord {
    pub level: String,
    pub message: String,
    /// Timestamp in the configured layout, present when the file path is on
    pub time_text: Option<String>,
    pub record: Record,
}

impl SynthesizedRecord {
    /// `<time> <LEVEL> <message>\n`, the search-engine file line.
    #[must_use]
    pub fn file_line(&self) -> String {
        format!(
            "{} {} {}\n",
            self.time_text.as_deref().unwrap_or_default(),
            self.level,
            self.message
        )
    }
}

#[derive(Debug, Clone)]
pub struct Synthesizer {
    tags: BTreeMap<String, String>,
    extra: Option<ExtraTags>,
    profile: SynthesisProfile,
    time_format: Option<TimeFormat>,
    placeholders: Regex,
}

impl Synthesizer {
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new(
        tags: BTreeMap<String, String>,
        extra: Option<ExtraTags>,
        profile: SynthesisProfile,
        time_format: Option<TimeFormat>,
    ) -> Self {
        let pattern = if profile.expand_strings {
            r"\$(IP|INT|STRING)"
        } else {
            r"\$(IP|INT)"
        };
        Synthesizer {
            tags,
            extra,
            profile,
            time_format,
            placeholders: Regex::new(pattern).expect("failed to compile placeholder pattern"),
        }
    }

    /// Synthesizer for a validated config. `counter` is shared by every worker of the run.
    #[must_use]
    pub fn from_config(
        config: &Config,
        time_format: TimeFormat,
        counter: Arc<IndexCounter>,
    ) -> Self {
        let extra = (config.send_large_json_logs && !config.extra_tags.is_empty()).then(|| {
            ExtraTags {
                tags: config.extra_tags.clone(),
                index_key: config.index_tag_key.clone(),
                counter,
            }
        });
        Synthesizer::new(
            config.tags.clone(),
            extra,
            SynthesisProfile::for_sink(config.sink, config.random_string_length),
            config.file_write.then_some(time_format),
        )
    }

    #[must_use]
    pub fn profile(&self) -> SynthesisProfile {
        self.profile
    }

    /// Synthesizes one record from a uniformly chosen template of `group`.
    ///
    /// Returns `None` only for an empty group, which the loader never produces.
    pub fn synthesize<R: Rng + ?Sized>(
        &self,
        group: &TemplateGroup,
        rng: &mut R,
    ) -> Option<SynthesizedRecord> {
        let template = group.choose(rng)?;
        let level = self.profile.severity_case.apply(&template.severity);
        let message = self.fill_placeholders(&template.message, rng);
        let time_text = self.time_format.as_ref().map(TimeFormat::now);

        let mut record = Record::default();
        for (key, value) in &self.tags {
            record.insert(key.clone(), Value::String(value.clone()));
        }
        if let Some(extra) = &self.extra {
            for (key, literal) in &extra.tags {
                let value = if *key == extra.index_key {
                    Value::from(extra.counter.next())
                } else {
                    let length = if literal.is_empty() {
                        DEFAULT_EXTRA_TAG_LENGTH
                    } else {
                        literal.chars().count()
                    };
                    Value::String(random_string(rng, length))
                };
                record.insert(key.clone(), value);
            }
        }
        record.insert("level", Value::String(level.clone()));
        record.insert("message", Value::String(message.clone()));
        record.insert("time", Value::from(Utc::now().timestamp_millis()));

        Some(SynthesizedRecord {
            level,
            message,
            time_text,
            record,
        })
    }

    /// Replaces every placeholder occurrence with a freshly drawn value.
    pub fn fill_placeholders<R: Rng + ?Sized>(&self, message: &str, rng: &mut R) -> String {
        let string_length = self.profile.string_length;
        self.placeholders
            .replace_all(message, |caps: &Captures| match &caps[1] {
                "IP" => random_ip(rng),
                "INT" => rng.gen_range(1..=65535u32).to_string(),
                _ => random_string(rng, string_length),
            })
            .into_owned()
    }
}

fn random_ip<R: Rng + ?Sized>(rng: &mut R) -> String {
    let octets: [u8; 4] = rng.gen();
    format!("{}.{}.{}.{}", octets[0], octets[1], octets[2], octets[3])
}

pub(crate) fn random_string<R: Rng + ?Sized>(rng: &mut R, length: usize) -> String {
    (0..length)
        .map(|_| char::from(rng.sample(Alphanumeric)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::Template;
    use proptest::prelude::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn group(severity: &str, message: &str) -> TemplateGroup {
        TemplateGroup::new(
            "test",
            vec![Template {
                severity: severity.to_string(),
                message: message.to_string(),
            }],
        )
    }

    fn synthesizer(kind: SinkKind) -> Synthesizer {
        Synthesizer::new(
            BTreeMap::from([("_tag_appName".to_string(), "demo".to_string())]),
            None,
            SynthesisProfile::for_sink(kind, 10),
            None,
        )
    }

    #[test]
    fn test_search_engine_record_shape() {
        let mut rng = SmallRng::seed_from_u64(1);
        let synthesized = synthesizer(SinkKind::Elasticsearch)
            .synthesize(&group("error", "conn failed from $IP"), &mut rng)
            .expect("group is not empty");

        assert_eq!(synthesized.level, "ERROR");
        let record = &synthesized.record;
        assert_eq!(record.get("level"), Some(&Value::from("ERROR")));
        assert_eq!(record.get("_tag_appName"), Some(&Value::from("demo")));
        assert!(record.get("time").and_then(Value::as_i64).is_some_and(|t| t > 0));
        let quad = Regex::new(r"^conn failed from \d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}$")
            .expect("valid regex");
        assert!(quad.is_match(&synthesized.message), "{}", synthesized.message);
        assert_eq!(synthesized.time_text, None);
    }

    #[test]
    fn test_broker_profile_lowercases_and_expands_strings() {
        let mut rng = SmallRng::seed_from_u64(2);
        let synthesized = synthesizer(SinkKind::Kafka)
            .synthesize(&group(" WARN ", "token $STRING issued"), &mut rng)
            .expect("group is not empty");
        assert_eq!(synthesized.level, "warn");
        let token = synthesized
            .message
            .strip_prefix("token ")
            .and_then(|rest| rest.strip_suffix(" issued"))
            .expect("message keeps its literal parts");
        assert_eq!(token.len(), 10);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_search_engine_profile_keeps_string_literal() {
        let mut rng = SmallRng::seed_from_u64(3);
        let message = synthesizer(SinkKind::Elasticsearch).fill_placeholders("$STRING", &mut rng);
        assert_eq!(message, "$STRING");
    }

    #[test]
    fn test_extra_tags_counter_and_padding() {
        let counter = Arc::new(IndexCounter::default());
        let synthesizer = Synthesizer::new(
            BTreeMap::new(),
            Some(ExtraTags {
                tags: BTreeMap::from([
                    ("log_index".to_string(), String::new()),
                    ("pad".to_string(), "abc".to_string()),
                    ("blank".to_string(), String::new()),
                ]),
                index_key: "log_index".to_string(),
                counter: Arc::clone(&counter),
            }),
            SynthesisProfile::for_sink(SinkKind::Kafka, 10),
            None,
        );
        let mut rng = SmallRng::seed_from_u64(4);
        let group = group("info", "hello");

        let first = synthesizer.synthesize(&group, &mut rng).expect("record");
        let second = synthesizer.synthesize(&group, &mut rng).expect("record");
        assert_eq!(first.record.get("log_index"), Some(&Value::from(1u64)));
        assert_eq!(second.record.get("log_index"), Some(&Value::from(2u64)));
        let pad = first.record.get("pad").and_then(Value::as_str).expect("pad");
        assert_eq!(pad.len(), 3);
        assert_ne!(pad, "abc");
        let blank = first.record.get("blank").and_then(Value::as_str).expect("blank");
        assert_eq!(blank.len(), DEFAULT_EXTRA_TAG_LENGTH);
    }

    #[test]
    fn test_file_line_uses_layout() {
        let synthesizer = Synthesizer::new(
            BTreeMap::new(),
            None,
            SynthesisProfile::for_sink(SinkKind::Elasticsearch, 10),
            Some(TimeFormat::parse("2006-01-02 15:04:05").expect("supported layout")),
        );
        let mut rng = SmallRng::seed_from_u64(5);
        let synthesized = synthesizer
            .synthesize(&group("info", "started"), &mut rng)
            .expect("record");
        let line = synthesized.file_line();
        let shape =
            Regex::new(r"^\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2} INFO started\n$").expect("valid");
        assert!(shape.is_match(&line), "{line:?}");
    }

    #[test]
    fn test_counter_is_unique_across_threads() {
        let counter = Arc::new(IndexCounter::default());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let counter = Arc::clone(&counter);
                std::thread::spawn(move || (0..1000).map(|_| counter.next()).collect::<Vec<_>>())
            })
            .collect();
        let mut values: Vec<u64> = handles
            .into_iter()
            .flat_map(|handle| handle.join().expect("thread panicked"))
            .collect();
        values.sort_unstable();
        values.dedup();
        assert_eq!(values.len(), 4000);
        assert_eq!(counter.current(), 4000);
    }

    #[test]
    fn test_encode_parses_back() {
        let mut rng = SmallRng::seed_from_u64(6);
        let synthesized = synthesizer(SinkKind::Elasticsearch)
            .synthesize(&group("info", "port $INT open"), &mut rng)
            .expect("record");
        let encoded = synthesized.record.encode().expect("record encodes");
        let parsed: Map<String, Value> = serde_json::from_slice(&encoded).expect("valid json");
        assert_eq!(&parsed, synthesized.record.fields());
    }

    proptest! {
        #[test]
        fn prop_every_ip_is_replaced(count in 0usize..8, seed in any::<u64>()) {
            let template = vec!["$IP"; count].join(" - ");
            let mut rng = SmallRng::seed_from_u64(seed);
            let message = synthesizer(SinkKind::Elasticsearch).fill_placeholders(&template, &mut rng);

            prop_assert!(!message.contains("$IP"));
            let quads: Vec<&str> = if count == 0 {
                Vec::new()
            } else {
                message.split(" - ").collect()
            };
            prop_assert_eq!(quads.len(), count);
            for quad in quads {
                let octets: Vec<&str> = quad.split('.').collect();
                prop_assert_eq!(octets.len(), 4);
                for octet in octets {
                    prop_assert!(octet.parse::<u8>().is_ok(), "octet {}", octet);
                }
            }
        }

        #[test]
        fn prop_every_int_is_in_range(count in 1usize..8, seed in any::<u64>()) {
            let template = vec!["$INT"; count].join(",");
            let mut rng = SmallRng::seed_from_u64(seed);
            let message = synthesizer(SinkKind::Kafka).fill_placeholders(&template, &mut rng);

            prop_assert!(!message.contains("$INT"));
            for value in message.split(',') {
                let value: u32 = value.parse().expect("integer");
                prop_assert!((1..=65535).contains(&value));
            }
        }
    }
}
