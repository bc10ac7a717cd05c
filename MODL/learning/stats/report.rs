use std::{cmp::Ordering, fmt};

use crate::json_writer::JsonWriter;

/// Sort values are compared after scaling by this factor and truncating.
const SORT_VALUE_PRECISION: f64 = 1e10;

/// Statistics computed once and reported as text table, text line or JSON.
pub trait LearningReport {
    /// Whether the statistics are computed.
    fn is_stats_computed(&self) -> bool;

    /// Identifier assigned by [`compute_rank_identifiers`].
    fn identifier(&self) -> &str;

    /// Sets the identifier.
    fn set_identifier(&mut self, identifier: String);

    /// Secondary sort key, ascending.
    fn sort_name(&self) -> &str;

    /// Primary sort key, descending.
    fn sort_value(&self) -> f64;

    /// Included in array reports.
    fn is_reported(&self) -> bool {
        true
    }

    /// Included in line reports.
    fn is_line_reported(&self) -> bool {
        true
    }

    /// Included in JSON reports; summaries list every report.
    fn is_json_reported(&self, summary: bool) -> bool {
        summary || self.is_reported()
    }

    /// Header of the line report.
    fn write_header_line_report(&self, out: &mut dyn fmt::Write) -> fmt::Result;

    /// One line, without the trailing newline.
    fn write_line_report(&self, out: &mut dyn fmt::Write) -> fmt::Result;

    /// Detailed text report.
    fn write_report(&self, out: &mut dyn fmt::Write) -> fmt::Result;

    /// Fields of the JSON object of this report.
    fn write_json_array_report_fields(&self, json: &mut JsonWriter, summary: bool);

    /// Detailed report as a keyed JSON object.
    fn write_json_key_report(&self, json: &mut JsonWriter, key: &str) {
        json.begin_key_object(key);
        self.write_json_array_report_fields(json, false);
        json.end_object();
    }
}

/// Orders by sort value descending at fixed precision, then by name ascending.
#[must_use]
pub fn compare_value<R: LearningReport + ?Sized>(first: &R, second: &R) -> Ordering {
    let scale = |value: f64| (value * SORT_VALUE_PRECISION) as i64;
    scale(second.sort_value())
        .cmp(&scale(first.sort_value()))
        .then_with(|| compare_name(first, second))
}

/// Orders by sort name.
#[must_use]
pub fn compare_name<R: LearningReport + ?Sized>(first: &R, second: &R) -> Ordering {
    first.sort_name().cmp(second.sort_name())
}

/// Assigns `R<rank>` identifiers, zero-padded to a common width, by decreasing value.
pub fn compute_rank_identifiers<R: LearningReport>(reports: &mut [R]) {
    let width = reports.len().to_string().len();
    let mut order: Vec<usize> = (0..reports.len()).collect();
    order.sort_by(|a, b| compare_value(&reports[*a], &reports[*b]));
    for (rank, index) in order.into_iter().enumerate() {
        reports[index].set_identifier(format!("R{:0width$}", rank + 1));
    }
}

fn sorted<'a>(
    reports: &[&'a dyn LearningReport],
    keep: impl Fn(&dyn LearningReport) -> bool,
) -> Vec<&'a dyn LearningReport> {
    let mut selected: Vec<&dyn LearningReport> =
        reports.iter().copied().filter(|report| keep(*report)).collect();
    selected.sort_by(|a, b| compare_value(*a, *b));
    selected
}

/// Detailed reports, separated by dashes, under a title.
pub fn write_array_report(
    out: &mut dyn fmt::Write,
    title: &str,
    reports: &[&dyn LearningReport],
) -> fmt::Result {
    let selected = sorted(reports, |report| report.is_reported());
    if selected.is_empty() {
        return Ok(());
    }
    write!(out, "\n\n{}\n\n{title}\n", "-".repeat(80))?;
    for (index, report) in selected.into_iter().enumerate() {
        writeln!(out)?;
        if index > 0 {
            writeln!(out, "{}", "-".repeat(46))?;
        }
        report.write_report(out)?;
    }
    Ok(())
}

/// Tab-separated table, header written once before the first row.
pub fn write_array_line_report(
    out: &mut dyn fmt::Write,
    title: &str,
    reports: &[&dyn LearningReport],
) -> fmt::Result {
    let selected = sorted(reports, |report| report.is_line_reported());
    if selected.is_empty() {
        return Ok(());
    }
    write!(out, "\n\n{title}\n\n")?;
    for (index, report) in selected.into_iter().enumerate() {
        if index == 0 {
            report.write_header_line_report(out)?;
            writeln!(out)?;
        }
        report.write_line_report(out)?;
        writeln!(out)?;
    }
    Ok(())
}

/// JSON array of report objects.
pub fn write_json_array_report(
    json: &mut JsonWriter,
    key: &str,
    reports: &[&dyn LearningReport],
    summary: bool,
) {
    let selected = sorted(reports, |report| report.is_json_reported(summary));
    if selected.is_empty() {
        return;
    }
    json.begin_key_array(key);
    for report in selected {
        json.begin_object();
        report.write_json_array_report_fields(json, summary);
        json.end_object();
    }
    json.end_array();
}

/// JSON object of detailed reports keyed by identifier.
pub fn write_json_dictionary_report(
    json: &mut JsonWriter,
    key: &str,
    reports: &[&dyn LearningReport],
) {
    let selected = sorted(reports, |report| report.is_json_reported(false));
    if selected.is_empty() {
        return;
    }
    json.begin_key_object(key);
    for report in selected {
        report.write_json_key_report(json, report.identifier());
    }
    json.end_object();
}
