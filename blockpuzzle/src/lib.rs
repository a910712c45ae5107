//! Data core for "block puzzle" timeline charts. Chart text parses into
//! tracks of date-bounded reservations; a projector then slices each track's
//! timeline at reservation boundaries and spreads the weekly hours budget
//! across every slice.

pub mod core {
    use chrono::NaiveDate;
    use serde::{Deserialize, Serialize};

    /* ------------------------------- Options ------------------------------- */

    /// Chart-wide configuration, overridable by `KEY: value` lines in the
    /// chart text. Only the hours fields feed the allocation math; the rest
    /// exists for a rendering layer to read.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Options {
        /// Weekly hours budget distributed within each slice.
        pub available_hours: f64,
        /// Hours reserved off the top of each slice for free time.
        pub free_time_hours: f64,
        pub track_height: f64,
        pub track_gap: f64,
        pub track_border_width: f64,
        pub reservation_padding: f64,
        pub label_font_family: String,
    }

    impl Default for Options {
        fn default() -> Self {
            Self {
                available_hours: 40.0,
                free_time_hours: 5.0,
                track_height: 40.0,
                track_gap: 5.0,
                track_border_width: 1.0,
                reservation_padding: 1.0,
                label_font_family: "sans-serif".to_string(),
            }
        }
    }

    impl Options {
        /// Apply a single `KEY: value` override. Keys match exactly; numeric
        /// values must parse to a finite float, otherwise the option keeps
        /// its previous value and the warning is returned to the caller.
        pub fn set(&mut self, key: &str, value: &str) -> Result<(), ChartWarning> {
            match key {
                "AVAILABLE_HOURS" => Self::set_f64(&mut self.available_hours, key, value),
                "FREE_TIME_HOURS" => Self::set_f64(&mut self.free_time_hours, key, value),
                "TRACK_HEIGHT" => Self::set_f64(&mut self.track_height, key, value),
                "TRACK_GAP" => Self::set_f64(&mut self.track_gap, key, value),
                "TRACK_BORDER_WIDTH" => Self::set_f64(&mut self.track_border_width, key, value),
                "RESERVATION_PADDING" => Self::set_f64(&mut self.reservation_padding, key, value),
                "LABEL_FONT_FAMILY" => {
                    self.label_font_family = value.to_string();
                    Ok(())
                }
                _ => Err(ChartWarning::UnknownSetting {
                    key: key.to_string(),
                }),
            }
        }

        fn set_f64(slot: &mut f64, key: &str, value: &str) -> Result<(), ChartWarning> {
            match value.parse::<f64>() {
                Ok(n) if n.is_finite() => {
                    *slot = n;
                    Ok(())
                }
                _ => Err(ChartWarning::InvalidSettingValue {
                    key: key.to_string(),
                    value: value.to_string(),
                }),
            }
        }
    }

    /* ------------------------------ Chart data ------------------------------ */

    /// Root parse result: options plus tracks in order of first appearance.
    /// Derived wholesale on every parse; nothing is updated in place.
    #[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
    pub struct ChartData {
        pub options: Options,
        pub tracks: Vec<Track>,
        /// Non-fatal problems hit during the parse, in input order.
        #[serde(default)]
        pub warnings: Vec<ChartWarning>,
    }

    /// A named row on the chart, usually a person.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Track {
        pub name: String,
        #[serde(default)]
        pub reservations: Vec<Reservation>,
    }

    impl Track {
        pub fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                reservations: vec![],
            }
        }
    }

    /// A time-bounded booking on a track. Days are inclusive on both ends
    /// and `start <= end` always (the range resolver normalizes reversed
    /// input). `hours == None` means the reservation shares whatever budget
    /// is left over in each slice it touches.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Reservation {
        pub name: String,
        /// `-` marker in the source; `+` is tentative. Display only, the
        /// allocator ignores it.
        pub confirmed: bool,
        pub start: NaiveDate,
        pub end: NaiveDate,
        pub hours: Option<f64>,
    }

    impl Reservation {
        pub fn new(name: &str, start: NaiveDate, end: NaiveDate, hours: Option<f64>) -> Self {
            Self {
                name: name.to_string(),
                confirmed: true,
                start,
                end,
                hours,
            }
        }
    }

    /* ------------------------------- Warnings ------------------------------- */

    /// Non-fatal problems collected while parsing. A parse never fails
    /// outright; each of these marks one skipped line or ignored value.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
    pub enum ChartWarning {
        #[error("unknown setting {key:?}")]
        UnknownSetting { key: String },
        #[error("invalid value {value:?} for setting {key}")]
        InvalidSettingValue { key: String, value: String },
        #[error("could not parse date range {token:?}")]
        BadDateRange { token: String },
        #[error("reservation {name:?} appears before any track line")]
        OrphanReservation { name: String },
    }

    #[cfg(test)]
    mod tests {
        use super::{ChartWarning, Options};

        #[test]
        fn defaults() {
            let options = Options::default();
            assert_eq!(options.available_hours, 40.0);
            assert_eq!(options.free_time_hours, 5.0);
            assert_eq!(options.label_font_family, "sans-serif");
        }

        #[test]
        fn set_overrides_numeric_and_string_options() {
            let mut options = Options::default();
            options.set("AVAILABLE_HOURS", "37.5").unwrap();
            options.set("LABEL_FONT_FAMILY", "monospace").unwrap();
            assert_eq!(options.available_hours, 37.5);
            assert_eq!(options.label_font_family, "monospace");
        }

        #[test]
        fn set_rejects_unknown_keys_and_bad_values() {
            let mut options = Options::default();
            assert!(matches!(
                options.set("POWER_LEVEL", "9001"),
                Err(ChartWarning::UnknownSetting { .. })
            ));
            assert!(matches!(
                options.set("TRACK_GAP", "wide"),
                Err(ChartWarning::InvalidSettingValue { .. })
            ));
            assert!(matches!(
                options.set("TRACK_GAP", "inf"),
                Err(ChartWarning::InvalidSettingValue { .. })
            ));
            assert_eq!(options.track_gap, 5.0);
        }
    }
}

pub mod dates {
    //! Date and period token grammar.
    //!
    //! Every token resolves to an inclusive `[start, end]` day range:
    //! - `D/M/YYYY` full date (day first), a single-day range
    //! - `M/YYYY` calendar month
    //! - `W##/YYYY` week (`w` also accepted), clamped to its calendar year
    //! - `Q#/YYYY` quarter, `H#/YYYY` half
    //! - `YYYY` full calendar year
    //!
    //! Two tokens joined by `-` form a range from the first token's start to
    //! the second token's end, normalized when written in reverse order.

    use chrono::{Datelike, Days, NaiveDate};
    use nom::{
        IResult,
        branch::alt,
        bytes::complete::take_while,
        character::complete::{char, one_of},
        combinator::{all_consuming, map_opt, map_res},
        error::{VerboseError, VerboseErrorKind},
        sequence::{separated_pair, tuple},
    };

    type PResult<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

    /* ------------------------------- Resolution ------------------------------- */

    /// Resolve one period token to an inclusive day range. `None` when no
    /// grammar matches the whole token.
    pub fn resolve_single(token: &str) -> Option<(NaiveDate, NaiveDate)> {
        all_consuming(alt((
            parse_full_date,
            parse_month,
            parse_week,
            parse_quarter,
            parse_half,
            parse_year,
        )))(token.trim())
        .ok()
        .map(|(_, range)| range)
    }

    /// Resolve a range expression: a single token, or two joined by `-`,
    /// spanning from the first token's start to the second token's end.
    /// Reversed input normalizes so `"A-B"` and `"B-A"` agree whenever the
    /// two periods do not overlap.
    pub fn resolve_range(text: &str) -> Option<(NaiveDate, NaiveDate)> {
        let Some((first, second)) = text.split_once('-') else {
            return resolve_single(text);
        };
        let (start1, end1) = resolve_single(first)?;
        let (start2, end2) = resolve_single(second)?;
        if start1 > end2 {
            Some((start2, end1))
        } else {
            Some((start1, end2))
        }
    }

    /* --------------------------------- Tokens --------------------------------- */

    fn parse_full_date(i: &str) -> PResult<'_, (NaiveDate, NaiveDate)> {
        map_opt(
            tuple((ordinal, char('/'), ordinal, char('/'), year)),
            |(day, _, month, _, year)| {
                let date = NaiveDate::from_ymd_opt(year, month, day)?;
                Some((date, date))
            },
        )(i)
    }

    fn parse_month(i: &str) -> PResult<'_, (NaiveDate, NaiveDate)> {
        map_opt(separated_pair(ordinal, char('/'), year), |(month, year)| {
            let start = NaiveDate::from_ymd_opt(year, month, 1)?;
            Some((start, month_end(start)?))
        })(i)
    }

    fn parse_week(i: &str) -> PResult<'_, (NaiveDate, NaiveDate)> {
        map_opt(
            tuple((one_of("wW"), ordinal, char('/'), year)),
            |(_, week, _, year)| week_range(week, year),
        )(i)
    }

    fn parse_quarter(i: &str) -> PResult<'_, (NaiveDate, NaiveDate)> {
        map_opt(
            tuple((char('Q'), one_of("1234"), char('/'), year)),
            |(_, quarter, _, year)| {
                let quarter = quarter.to_digit(10)?;
                let start = NaiveDate::from_ymd_opt(year, (quarter - 1) * 3 + 1, 1)?;
                let last = NaiveDate::from_ymd_opt(year, quarter * 3, 1)?;
                Some((start, month_end(last)?))
            },
        )(i)
    }

    fn parse_half(i: &str) -> PResult<'_, (NaiveDate, NaiveDate)> {
        map_opt(
            tuple((char('H'), one_of("12"), char('/'), year)),
            |(_, half, _, year)| {
                let half = half.to_digit(10)?;
                let start = NaiveDate::from_ymd_opt(year, (half - 1) * 6 + 1, 1)?;
                let last = NaiveDate::from_ymd_opt(year, half * 6, 1)?;
                Some((start, month_end(last)?))
            },
        )(i)
    }

    fn parse_year(i: &str) -> PResult<'_, (NaiveDate, NaiveDate)> {
        map_opt(year, |year| {
            Some((
                NaiveDate::from_ymd_opt(year, 1, 1)?,
                NaiveDate::from_ymd_opt(year, 12, 31)?,
            ))
        })(i)
    }

    /* -------------------------------- Calendar -------------------------------- */

    /// Last day of `start`'s month: the day before the first of the next one.
    fn month_end(start: NaiveDate) -> Option<NaiveDate> {
        let next_first = if start.month() == 12 {
            NaiveDate::from_ymd_opt(start.year() + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(start.year(), start.month() + 1, 1)
        }?;
        next_first.pred_opt()
    }

    /// ISO-style week range: week 1's Monday is the Monday on/before Jan 4.
    /// The range clamps to the calendar year instead of crossing into its
    /// neighbors; a clamp that inverts the range rejects the token, which
    /// also rules out week numbers the year does not have.
    fn week_range(week: u32, year: i32) -> Option<(NaiveDate, NaiveDate)> {
        let jan4 = NaiveDate::from_ymd_opt(year, 1, 4)?;
        let week1_monday =
            jan4.checked_sub_days(Days::new(u64::from(jan4.weekday().num_days_from_monday())))?;
        let start =
            week1_monday.checked_add_days(Days::new(7 * u64::from(week).checked_sub(1)?))?;
        let end = start.checked_add_days(Days::new(6))?;
        let start = start.max(NaiveDate::from_ymd_opt(year, 1, 1)?);
        let end = end.min(NaiveDate::from_ymd_opt(year, 12, 31)?);
        (start <= end).then_some((start, end))
    }

    /* --------------------------------- Digits --------------------------------- */

    /// A one-or-two digit calendar ordinal: day, month, or week number.
    fn ordinal(i: &str) -> PResult<'_, u32> {
        map_res(take_while_m_n(1, 2, char_is_digit), |s: &str| {
            s.parse::<u32>()
        })(i)
    }

    /// Exactly four digits. Two-digit years are not a thing here.
    fn year(i: &str) -> PResult<'_, i32> {
        map_res(take_while_m_n(4, 4, char_is_digit), |s: &str| {
            s.parse::<i32>()
        })(i)
    }

    fn take_while_m_n<F>(m: usize, n: usize, cond: F) -> impl Fn(&str) -> PResult<'_, &str>
    where
        F: Fn(char) -> bool + Copy,
    {
        move |i: &str| {
            let (i, out) = take_while(cond)(i)?;
            if out.len() < m || out.len() > n {
                Err(nom::Err::Error(VerboseError {
                    errors: vec![(i, VerboseErrorKind::Context("m_n"))],
                }))
            } else {
                Ok((i, out))
            }
        }
    }

    fn char_is_digit(c: char) -> bool {
        c.is_ascii_digit()
    }

}

pub mod parser {
    //! Line-oriented chart text parser.
    //!
    //! Three line shapes are recognized, tried in order; anything else is
    //! ignored:
    //! - `KEY: value` at column 0 overrides an option
    //! - `* Name` starts a track (leading whitespace allowed)
    //! - `- Name: <range>[, <hours>]` adds a confirmed reservation to the
    //!   current track (`+` for tentative)
    //!
    //! Nothing here fails the parse as a whole: bad lines are skipped,
    //! logged, and recorded as warnings on the returned `ChartData`.

    use crate::core::{ChartData, ChartWarning, Options, Reservation, Track};
    use crate::dates;
    use anyhow::{Context, Result};
    use nom::{
        IResult,
        bytes::complete::{tag_no_case, take_till1, take_while1},
        character::complete::{char, digit0, digit1, one_of, space0},
        combinator::{map, map_res, opt, recognize, rest},
        error::VerboseError,
        sequence::{preceded, separated_pair, tuple},
    };
    use std::{fs, path::Path};

    type PResult<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

    /* ------------------------ Public entry points ------------------------ */

    /// Parse chart text into options, tracks, and reservations. Problem
    /// lines are skipped and recorded on `ChartData::warnings`.
    pub fn parse_chart(text: &str) -> ChartData {
        let mut data = ChartData::default();
        let mut current: Option<usize> = None;

        for line in text.lines() {
            if let Ok((_, (key, value))) = parse_setting_line(line) {
                apply_setting(&mut data, key, value);
                continue;
            }
            if let Ok((_, name)) = parse_track_line(line) {
                let name = name.trim();
                if name.is_empty() {
                    continue;
                }
                data.tracks.push(Track::new(name));
                current = Some(data.tracks.len() - 1);
                continue;
            }
            if let Ok((_, (marker, name, body))) = parse_reservation_line(line) {
                add_reservation(&mut data, current, marker, name, body);
            }
        }
        data
    }

    /// Load and parse a chart file.
    pub fn parse_chart_file(path: &Path) -> Result<ChartData> {
        let text = fs::read_to_string(path).with_context(|| format!("reading {:?}", path))?;
        Ok(parse_chart(&text))
    }

    /* -------------------------------- Lines -------------------------------- */

    fn parse_setting_line(i: &str) -> PResult<'_, (&str, &str)> {
        separated_pair(
            take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_'),
            char(':'),
            rest,
        )(i)
    }

    fn parse_track_line(i: &str) -> PResult<'_, &str> {
        preceded(tuple((space0, char('*'))), rest)(i)
    }

    fn parse_reservation_line(i: &str) -> PResult<'_, (char, &str, &str)> {
        map(
            tuple((
                space0,
                one_of("-+"),
                take_till1(|c| c == ':'),
                char(':'),
                rest,
            )),
            |(_, marker, name, _, body)| (marker, name, body),
        )(i)
    }

    fn apply_setting(data: &mut ChartData, key: &str, value: &str) {
        if let Err(warning) = data.options.set(key.trim(), value.trim()) {
            log::warn!("{warning}");
            data.warnings.push(warning);
        }
    }

    fn add_reservation(
        data: &mut ChartData,
        current: Option<usize>,
        marker: char,
        name: &str,
        body: &str,
    ) {
        let Some(track) = current else {
            let warning = ChartWarning::OrphanReservation {
                name: name.trim().to_string(),
            };
            log::error!("{warning}");
            data.warnings.push(warning);
            return;
        };

        let name = name.trim();
        if name.is_empty() {
            return;
        }

        let mut segments = body.split(',');
        let token = segments.next().unwrap_or("").trim();
        let Some((start, end)) = dates::resolve_range(token) else {
            let warning = ChartWarning::BadDateRange {
                token: token.to_string(),
            };
            log::error!("{warning}");
            data.warnings.push(warning);
            return;
        };
        let hours = segments.next().and_then(|s| parse_hours(s, &data.options));

        data.tracks[track].reservations.push(Reservation {
            name: name.to_string(),
            confirmed: marker == '-',
            start,
            end,
            hours,
        });
    }

    /* -------------------------------- Hours -------------------------------- */

    /// Parse an hours segment: a decimal number with an optional
    /// case-insensitive `fte` suffix multiplying the weekly budget. Other
    /// trailing text (`hrs`, typically) is ignored; a missing leading number
    /// means no hours were specified.
    pub fn parse_hours(s: &str, options: &Options) -> Option<f64> {
        let (_, (hours, fte)) =
            tuple((decimal, opt(preceded(space0, tag_no_case("fte")))))(s.trim()).ok()?;
        if fte.is_some() {
            Some(hours * options.available_hours)
        } else {
            Some(hours)
        }
    }

    fn decimal(i: &str) -> PResult<'_, f64> {
        map_res(
            recognize(tuple((digit1, opt(preceded(char('.'), digit0))))),
            |s: &str| s.parse::<f64>(),
        )(i)
    }

    #[cfg(test)]
    mod tests {
        use super::{parse_chart, parse_hours};
        use crate::core::{ChartWarning, Options};
        use chrono::NaiveDate;

        fn day(y: i32, m: u32, d: u32) -> NaiveDate {
            NaiveDate::from_ymd_opt(y, m, d).unwrap()
        }

        #[test]
        fn settings_override_options() {
            let data = parse_chart("AVAILABLE_HOURS: 42\n* user1\n");
            assert_eq!(data.tracks.len(), 1);
            assert_eq!(data.tracks[0].name, "user1");
            assert!(data.tracks[0].reservations.is_empty());
            assert_eq!(data.options.available_hours, 42.0);
            assert!(data.warnings.is_empty());
        }

        #[test]
        fn unknown_setting_warns_and_continues() {
            let data = parse_chart("NONSENSE: 12\n* user1\n");
            assert_eq!(data.tracks.len(), 1);
            assert_eq!(
                data.warnings,
                vec![ChartWarning::UnknownSetting {
                    key: "NONSENSE".to_string()
                }]
            );
        }

        #[test]
        fn bad_setting_value_keeps_default() {
            let data = parse_chart("FREE_TIME_HOURS: special\n");
            assert_eq!(data.options.free_time_hours, 5.0);
            assert!(matches!(
                data.warnings[0],
                ChartWarning::InvalidSettingValue { .. }
            ));
        }

        #[test]
        fn string_settings_keep_spaces() {
            let data = parse_chart("LABEL_FONT_FAMILY: Liberation Sans\n");
            assert_eq!(data.options.label_font_family, "Liberation Sans");
        }

        #[test]
        fn indented_settings_are_ignored() {
            let data = parse_chart("  AVAILABLE_HOURS: 42\n");
            assert_eq!(data.options.available_hours, 40.0);
            assert!(data.warnings.is_empty());
        }

        #[test]
        fn confirmed_reservation_without_hours() {
            let data = parse_chart("* User One\n - Reservation One: Q1/2001");
            assert_eq!(data.tracks.len(), 1);
            let reservation = &data.tracks[0].reservations[0];
            assert_eq!(reservation.name, "Reservation One");
            assert!(reservation.confirmed);
            assert_eq!(reservation.start, day(2001, 1, 1));
            assert_eq!(reservation.end, day(2001, 3, 31));
            assert_eq!(reservation.hours, None);
        }

        #[test]
        fn tentative_reservation_with_hours() {
            let data = parse_chart("* User One\n + Reservation One: Q3/2009-Q4/2009, 30hrs");
            let reservation = &data.tracks[0].reservations[0];
            assert!(!reservation.confirmed);
            assert_eq!(reservation.start, day(2009, 7, 1));
            assert_eq!(reservation.end, day(2009, 12, 31));
            assert_eq!(reservation.hours, Some(30.0));
        }

        #[test]
        fn reservation_before_any_track_is_dropped() {
            let data = parse_chart(" - Orphan: Q1/2001\n* user1\n");
            assert_eq!(data.tracks.len(), 1);
            assert!(data.tracks[0].reservations.is_empty());
            assert_eq!(
                data.warnings,
                vec![ChartWarning::OrphanReservation {
                    name: "Orphan".to_string()
                }]
            );
        }

        #[test]
        fn bad_date_range_drops_that_line_only() {
            let data =
                parse_chart("* user1\n - Good: Q1/2001\n - Bad: nonsense\n - Also Good: 2002\n");
            let names: Vec<&str> = data.tracks[0]
                .reservations
                .iter()
                .map(|r| r.name.as_str())
                .collect();
            assert_eq!(names, ["Good", "Also Good"]);
            assert_eq!(
                data.warnings,
                vec![ChartWarning::BadDateRange {
                    token: "nonsense".to_string()
                }]
            );
        }

        #[test]
        fn empty_names_are_skipped_silently() {
            let data = parse_chart("* \n* user2\n - : Q1/2001\n");
            assert_eq!(data.tracks.len(), 1);
            assert_eq!(data.tracks[0].name, "user2");
            assert!(data.tracks[0].reservations.is_empty());
            assert!(data.warnings.is_empty());
        }

        #[test]
        fn reservations_attach_to_the_latest_track() {
            let data = parse_chart("* a\n* b\n - R: 2001\n");
            assert!(data.tracks[0].reservations.is_empty());
            assert_eq!(data.tracks[1].reservations.len(), 1);
        }

        #[test]
        fn extra_body_segments_are_ignored() {
            let data = parse_chart("* a\n - R: 2001, 10, whatever else\n");
            assert_eq!(data.tracks[0].reservations[0].hours, Some(10.0));
        }

        #[test]
        fn fte_multiplies_the_configured_budget() {
            let data = parse_chart("AVAILABLE_HOURS: 30\n* a\n - R: 2001, 0.5fte\n");
            assert_eq!(data.tracks[0].reservations[0].hours, Some(15.0));
        }

        #[test]
        fn hours_strings() {
            let options = Options::default();
            assert_eq!(parse_hours("24", &options), Some(24.0));
            assert_eq!(parse_hours("24.", &options), Some(24.0));
            assert_eq!(parse_hours("24.456", &options), Some(24.456));
            assert_eq!(parse_hours("24.456 hrs", &options), Some(24.456));
            assert_eq!(parse_hours("24.456hrs", &options), Some(24.456));
            assert_eq!(parse_hours("1fte", &options), Some(40.0));
            assert_eq!(parse_hours("2fte", &options), Some(80.0));
            assert_eq!(parse_hours("0.5fte", &options), Some(20.0));
            assert_eq!(parse_hours("0.1fte", &options), Some(4.0));
            assert_eq!(parse_hours("0.1FTE", &options), Some(4.0));
            assert_eq!(parse_hours("0.1 FTE", &options), Some(4.0));
            assert_eq!(parse_hours("0.1\tFTE", &options), Some(4.0));
            assert_eq!(parse_hours("on request", &options), None);
        }
    }
}

pub mod schedule {
    //! Read models produced by the schedule projector.

    use chrono::NaiveDate;
    use serde::{Deserialize, Serialize};

    /// A maximal sub-interval of a track's span overlapped by a constant set
    /// of reservations. Days are inclusive on both ends; slices of one track
    /// are contiguous and never share a day.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Slice {
        pub start: NaiveDate,
        pub end: NaiveDate,
        /// Indices into the owning track's reservation list.
        pub reservations: Vec<usize>,
        /// Allocated hours, positionally matching `reservations`.
        pub reservation_hours: Vec<f64>,
        /// Budget hours not attributed to any reservation.
        pub unused_hours: f64,
    }

    impl Slice {
        pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
            Self {
                start,
                end,
                reservations: vec![],
                reservation_hours: vec![],
                unused_hours: 0.0,
            }
        }

        /// Hours allocated to the given reservation index, if the
        /// reservation overlaps this slice.
        pub fn hours_for(&self, reservation: usize) -> Option<f64> {
            let at = self.reservations.iter().position(|r| *r == reservation)?;
            self.reservation_hours.get(at).copied()
        }

        /// Total committed hours including free time. May exceed the weekly
        /// budget when explicit reservations overcommit the slice.
        pub fn total_hours_reserved(&self) -> f64 {
            self.unused_hours + self.reservation_hours.iter().sum::<f64>()
        }
    }

    /// One track's projection: its span and allocated slices.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct TrackSchedule {
        pub name: String,
        pub start: NaiveDate,
        pub end: NaiveDate,
        pub slices: Vec<Slice>,
    }
}

pub mod projectors {
    pub mod schedule_projector {
        use crate::core::{ChartData, Options, Reservation};
        use crate::schedule::{Slice, TrackSchedule};
        use chrono::{Datelike, NaiveDate};

        /// Project every track in the chart against the chart span. Empty
        /// when no track has any reservation.
        pub fn project_chart(data: &ChartData) -> Vec<TrackSchedule> {
            let Some((start, end)) = chart_span(data) else {
                return vec![];
            };
            data.tracks
                .iter()
                .map(|track| {
                    project_track(&track.name, start, end, &track.reservations, &data.options)
                })
                .collect()
        }

        /// Project one track: slice its span at reservation boundaries,
        /// then allocate hours within each slice.
        pub fn project_track(
            name: &str,
            start: NaiveDate,
            end: NaiveDate,
            reservations: &[Reservation],
            options: &Options,
        ) -> TrackSchedule {
            let mut slices = build_slices(start, end, reservations);
            for slice in &mut slices {
                allocate_hours(slice, reservations, options);
            }
            TrackSchedule {
                name: name.to_string(),
                start,
                end,
                slices,
            }
        }

        /* -------------------------------- Slicing -------------------------------- */

        /// Split `[start, end]` at every reservation boundary. The produced
        /// slices are contiguous, non-overlapping, and collectively cover
        /// the span; each reservation is recorded by index on every slice
        /// it overlaps.
        pub fn build_slices(
            start: NaiveDate,
            end: NaiveDate,
            reservations: &[Reservation],
        ) -> Vec<Slice> {
            let mut boundaries = vec![start, day_after(end)];
            for reservation in reservations {
                boundaries.push(reservation.start);
                boundaries.push(day_after(reservation.end));
            }
            boundaries.sort();

            let mut slices = Vec::new();
            for pair in boundaries.windows(2) {
                let (lo, hi) = (pair[0], pair[1]);
                if lo == hi {
                    continue;
                }
                let mut slice = Slice::new(lo, day_before(hi));
                for (index, reservation) in reservations.iter().enumerate() {
                    if reservation.end >= lo && reservation.start < hi {
                        slice.reservations.push(index);
                    }
                }
                slices.push(slice);
            }
            slices
        }

        /* ------------------------------- Allocation ------------------------------- */

        /// Distribute the weekly budget across a slice. Explicit hours are
        /// taken off the top; if anything remains, free time is reserved
        /// next (even when that overdraws the budget); whatever is left,
        /// floored at zero, is split evenly among reservations without
        /// explicit hours.
        pub fn allocate_hours(slice: &mut Slice, reservations: &[Reservation], options: &Options) {
            slice.reservation_hours = vec![0.0; slice.reservations.len()];
            slice.unused_hours = 0.0;

            let mut hours_left = options.available_hours;
            let mut undetermined = Vec::new();
            for (at, index) in slice.reservations.iter().enumerate() {
                match reservations.get(*index).and_then(|r| r.hours) {
                    Some(hours) => {
                        hours_left -= hours;
                        slice.reservation_hours[at] = hours;
                    }
                    None => undetermined.push(at),
                }
            }

            if hours_left > 0.0 {
                slice.unused_hours = options.free_time_hours;
                hours_left -= options.free_time_hours;
            }

            if undetermined.is_empty() {
                slice.unused_hours += hours_left.max(0.0);
                return;
            }

            let share = hours_left.max(0.0) / undetermined.len() as f64;
            for at in undetermined {
                slice.reservation_hours[at] = share;
            }
        }

        /* ------------------------------- Chart span ------------------------------- */

        /// Year-snapped envelope of every reservation in the chart: Jan 1
        /// of the earliest start year through Dec 31 of the latest end
        /// year. `None` when no track has any reservation.
        pub fn chart_span(data: &ChartData) -> Option<(NaiveDate, NaiveDate)> {
            let mut span: Option<(NaiveDate, NaiveDate)> = None;
            for track in &data.tracks {
                for reservation in &track.reservations {
                    span = Some(match span {
                        None => (reservation.start, reservation.end),
                        Some((start, end)) => {
                            (start.min(reservation.start), end.max(reservation.end))
                        }
                    });
                }
            }
            let Some((earliest, latest)) = span else {
                log::warn!("no reservations in any track; chart span is undefined");
                return None;
            };
            Some((
                NaiveDate::from_ymd_opt(earliest.year(), 1, 1)?,
                NaiveDate::from_ymd_opt(latest.year(), 12, 31)?,
            ))
        }

        fn day_after(date: NaiveDate) -> NaiveDate {
            date.succ_opt().unwrap_or(NaiveDate::MAX)
        }

        fn day_before(date: NaiveDate) -> NaiveDate {
            date.pred_opt().unwrap_or(NaiveDate::MIN)
        }

    }
}

pub use parser::{parse_chart, parse_chart_file};
pub use projectors::schedule_projector::project_chart;
