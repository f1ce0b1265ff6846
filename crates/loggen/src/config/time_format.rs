// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Timestamp layouts accepted in `time_format`.
//!
//! Configs name layouts with Go-style reference strings (`2006-01-02 15:04:05`). Only the
//! layouts in [`SUPPORTED_TIME_FORMATS`] are accepted; each one maps to a `chrono` strftime
//! pattern used when rendering the file-path timestamp.
//!
//! Pieces that are not Go reference tokens stay literal, as Go renders them: `Sun` (the
//! weekday token is `Mon`), `+0000` (the zone token is `-0700`), and `:000` or `*000`
//! (fractional seconds need a `.` or `,` separator).

use std::fmt::Display;

use chrono::{DateTime, Local, TimeZone};

use crate::errors::ConfigError;

/// Reference layout and the equivalent strftime pattern.
pub const SUPPORTED_TIME_FORMATS: [(&str, &str); 13] = [
    ("Sun Jan 2 15:04:05 2006", "Sun %b %-d %H:%M:%S %Y"),
    ("2006-01-02-15.04.05.000000", "%Y-%m-%d-%H.%M.%S%.6f"),
    ("2006-01-02 15:04:05,000", "%Y-%m-%d %H:%M:%S,%3f"),
    ("20060102-15:04:05:000", "%Y%m%d-%H:%M:%S:000"),
    ("Jan 2 15:04:05", "%b %-d %H:%M:%S"),
    ("2006-02-01_15:04:05", "%Y-%d-%m_%H:%M:%S"),
    ("01.02 15:04:05", "%m.%d %H:%M:%S"),
    ("06/01/02 15:04:05", "%y/%m/%d %H:%M:%S"),
    ("2006/01/02 15:04:05", "%Y/%m/%d %H:%M:%S"),
    ("2006-01-02 15:04:05", "%Y-%m-%d %H:%M:%S"),
    ("2006-01-02'T'15:04:05*000+0000", "%Y-%m-%d'T'%H:%M:%S*000+0000"),
    ("2006-01-02T15:04:05+0000", "%Y-%m-%dT%H:%M:%S+0000"),
    ("2006-01-02T15:04:05.000'+0000'", "%Y-%m-%dT%H:%M:%S%.3f'+0000'"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeFormat {
    layout: &'static str,
    pattern: &'static str,
}

impl TimeFormat {
    /// Looks `layout` up in the allow-list.
    pub fn parse(layout: &str) -> Result<Self, ConfigError> {
        SUPPORTED_TIME_FORMATS
            .iter()
            .find(|(candidate, _)| *candidate == layout)
            .map(|&(layout, pattern)| TimeFormat { layout, pattern })
            .ok_or_else(|| {
                let supported = SUPPORTED_TIME_FORMATS
                    .iter()
                    .map(|(layout, _)| *layout)
                    .collect::<Vec<_>>()
                    .join(" | ");
                ConfigError::UnsupportedTimeFormat(layout.to_string(), supported)
            })
    }

    #[must_use]
    pub fn layout(&self) -> &'static str {
        self.layout
    }

    #[must_use]
    pub fn pattern(&self) -> &'static str {
        self.pattern
    }

    pub fn format<Tz>(&self, at: &DateTime<Tz>) -> String
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        at.format(self.pattern).to_string()
    }

    #[must_use]
    pub fn now(&self) -> String {
        self.format(&Local::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, NaiveDate};

    // Thursday, two hours east of UTC
    fn reference_time() -> DateTime<FixedOffset> {
        let naive = NaiveDate::from_ymd_opt(2024, 3, 7)
            .expect("valid date")
            .and_hms_milli_opt(9, 5, 2, 45)
            .expect("valid time");
        FixedOffset::east_opt(2 * 3600)
            .expect("valid offset")
            .from_local_datetime(&naive)
            .single()
            .expect("unambiguous time")
    }

    #[test]
    fn test_every_supported_layout_parses() {
        for (layout, _) in SUPPORTED_TIME_FORMATS {
            let format = TimeFormat::parse(layout).expect("layout should be supported");
            assert_eq!(format.layout(), layout);
            assert!(!format.now().is_empty());
        }
    }

    #[test]
    fn test_unknown_layout_is_rejected() {
        let err = TimeFormat::parse("%Y-%m-%d").unwrap_err();
        match err {
            ConfigError::UnsupportedTimeFormat(layout, supported) => {
                assert_eq!(layout, "%Y-%m-%d");
                assert!(supported.contains("2006-01-02 15:04:05"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_formats_render_like_reference_layouts() {
        let at = reference_time();
        let cases = [
            ("2006-01-02 15:04:05", "2024-03-07 09:05:02"),
            ("2006-01-02 15:04:05,000", "2024-03-07 09:05:02,045"),
            ("2006-01-02-15.04.05.000000", "2024-03-07-09.05.02.045000"),
            ("Jan 2 15:04:05", "Mar 7 09:05:02"),
            ("2006-02-01_15:04:05", "2024-07-03_09:05:02"),
            ("06/01/02 15:04:05", "24/03/07 09:05:02"),
            ("01.02 15:04:05", "03.07 09:05:02"),
            ("2006/01/02 15:04:05", "2024/03/07 09:05:02"),
        ];
        for (layout, expected) in cases {
            let format = TimeFormat::parse(layout).expect("layout should be supported");
            assert_eq!(format.format(&at), expected, "layout {layout}");
        }
    }

    #[test]
    fn test_non_reference_pieces_render_literally() {
        let at = reference_time();
        let cases = [
            ("Sun Jan 2 15:04:05 2006", "Sun Mar 7 09:05:02 2024"),
            ("20060102-15:04:05:000", "20240307-09:05:02:000"),
            ("2006-01-02'T'15:04:05*000+0000", "2024-03-07'T'09:05:02*000+0000"),
            ("2006-01-02T15:04:05+0000", "2024-03-07T09:05:02+0000"),
            ("2006-01-02T15:04:05.000'+0000'", "2024-03-07T09:05:02.045'+0000'"),
        ];
        for (layout, expected) in cases {
            let format = TimeFormat::parse(layout).expect("layout should be supported");
            assert_eq!(format.format(&at), expected, "layout {layout}");
        }
    }
}
