/// Warning extraction for one location.
///
/// A single document-order pass over every timeslice. For each
/// `phenomenon/location` block naming the configured location:
///
/// - `location_warning_status > 0` arms the block and raises the running
///   severity to at least that value;
/// - the next `text` element in an armed block disarms it, stamps the
///   warning window with the timeslice time and collects its `text_data`.
///
/// A `location_id` naming another location ends that block's scan; sibling
/// blocks are still visited. The window start is the first stamped
/// timeslice and the end the last one, both in document order.

use crate::logging::Component;
use crate::model::WarningResult;
use crate::scheduler::Extract;
use crate::warnings::document::{Element, RawDocument};
use crate::warnings::render::Renderer;
use chrono::{DateTime, NaiveDateTime};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

pub struct WarningExtractor {
    location: String,
    renderer: Renderer,
}

/// Running totals of one extraction pass.
#[derive(Debug, Default)]
struct Scan {
    severity: u32,
    start_time: Option<NaiveDateTime>,
    end_time: Option<NaiveDateTime>,
    messages: Vec<String>,
}

impl Scan {
    fn stamp(&mut self, at: NaiveDateTime) {
        if self.start_time.is_none() {
            self.start_time = Some(at);
        }
        self.end_time = Some(at);
    }

    fn push_message(&mut self, text: &str) {
        if !self.messages.iter().any(|m| m == text) {
            self.messages.push(text.to_string());
        }
    }
}

impl WarningExtractor {
    pub fn new(location: impl Into<String>, renderer: Renderer) -> Self {
        WarningExtractor {
            location: location.into(),
            renderer,
        }
    }

    /// Extracts from the document stored at `path`.
    ///
    /// A missing file is the normal state before the first download and
    /// yields the "no data" result. An unreadable or malformed document
    /// yields the same result plus an error log entry.
    pub fn extract(&self, path: &Path) -> WarningResult {
        let component = Component::Extract;

        if !path.is_file() {
            info!(%component, path = %path.display(), "No local document yet");
            return WarningResult::no_data(self.renderer.no_data());
        }

        match RawDocument::from_path(path) {
            Ok(doc) => self.extract_document(&doc),
            Err(err) => {
                error!(%component, path = %path.display(), "Cannot read warning document: {}", err);
                WarningResult::no_data(self.renderer.no_data())
            }
        }
    }

    pub fn extract_str(&self, xml: &str) -> WarningResult {
        match RawDocument::parse_str(xml) {
            Ok(doc) => self.extract_document(&doc),
            Err(err) => {
                error!(component = %Component::Extract, "Cannot parse warning document: {}", err);
                WarningResult::no_data(self.renderer.no_data())
            }
        }
    }

    pub fn extract_document(&self, doc: &RawDocument) -> WarningResult {
        let mut scan = Scan::default();

        for timeslice in doc.timeslices() {
            let time = timeslice_time(timeslice);

            for phenomenon in timeslice.descendants().filter(|e| e.name == "phenomenon") {
                for location in phenomenon.children_named("location") {
                    self.scan_location(location, time, &mut scan);
                }
            }
        }

        let rendered_text = self
            .renderer
            .render(scan.start_time, scan.end_time, &scan.messages);

        WarningResult {
            severity: scan.severity,
            start_time: scan.start_time,
            end_time: scan.end_time,
            messages: scan.messages,
            rendered_text,
        }
    }

    fn scan_location(&self, location: &Element, time: Option<NaiveDateTime>, scan: &mut Scan) {
        let component = Component::Extract;
        let mut armed = false;

        for field in &location.children {
            match field.name.as_str() {
                "location_id" if field.text() != Some(self.location.as_str()) => break,
                "location_warning_status" => {
                    let raw = field.text().unwrap_or_default();
                    match raw.parse::<u32>() {
                        Ok(status) if status > 0 => {
                            armed = true;
                            scan.severity = scan.severity.max(status);
                        }
                        Ok(_) => {}
                        Err(_) => {
                            warn!(%component, value = raw, "Unreadable location_warning_status, skipped")
                        }
                    }
                }
                "text" if armed => {
                    armed = false;
                    match time {
                        Some(at) => {
                            debug!(%component, %at, "Time slot with warning");
                            scan.stamp(at);
                        }
                        None => warn!(%component, "Warning text in a timeslice without a valid timeslice_id"),
                    }
                    for data in field.children_named("text_data") {
                        if let Some(text) = data.text().filter(|t| !t.is_empty()) {
                            scan.push_message(text);
                        }
                    }
                }
                _ => {}
            }
        }
    }
}

/// Parses a timeslice's `timeslice_id`, keeping the wall-clock time of any
/// offset it carries.
fn timeslice_time(timeslice: &Element) -> Option<NaiveDateTime> {
    let raw = timeslice.child("timeslice_id").and_then(Element::text)?;
    let parsed = parse_timestamp(raw);
    if parsed.is_none() {
        warn!(component = %Component::Extract, value = raw, "Unreadable timeslice_id");
    }
    parsed
}

pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    if let Ok(with_offset) = DateTime::parse_from_rfc3339(raw) {
        return Some(with_offset.naive_local());
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
}

// ---------------------------------------------------------------------------
// Scheduler binding
// ---------------------------------------------------------------------------

/// The extractor bound to the fixed local document path.
pub struct LocalDocument {
    pub path: PathBuf,
    pub extractor: WarningExtractor,
}

impl Extract for LocalDocument {
    fn extract(&self) -> WarningResult {
        self.extractor.extract(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TextConfig;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn extractor() -> WarningExtractor {
        let weekdays = ["Ma", "Di", "Wo", "Do", "Vr", "Za", "Zo"].map(String::from).to_vec();
        WarningExtractor::new("NH", Renderer::new(weekdays, TextConfig::default()))
    }

    fn location(id: &str, status: u32, text: Option<&str>) -> String {
        let text = text
            .map(|t| format!("<text><text_data>{}</text_data></text>", t))
            .unwrap_or_default();
        format!(
            "<location><location_id>{}</location_id>\
             <location_warning_status>{}</location_warning_status>{}</location>",
            id, status, text
        )
    }

    fn timeslice(id: &str, locations: &[String]) -> String {
        format!(
            "<timeslice><timeslice_id>{}</timeslice_id><phenomenon>{}</phenomenon></timeslice>",
            id,
            locations.concat()
        )
    }

    fn document(timeslices: &[String]) -> String {
        format!("<report><data><cube>{}</cube></data></report>", timeslices.concat())
    }

    fn at(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 2, 12).unwrap().and_hms_opt(hour, 0, 0).unwrap()
    }

    #[test]
    fn test_status_zero_location_contributes_nothing() {
        let xml = document(&[timeslice(
            "2024-02-12T07:00:00",
            &[location("NH", 0, Some("Geen waarschuwing"))],
        )]);
        let result = extractor().extract_str(&xml);
        assert_eq!(result.severity, 0);
        assert!(result.messages.is_empty());
        assert_eq!(result.start_time, None);
        assert_eq!(result.rendered_text, "Geen waarschuwingen");
    }

    #[test]
    fn test_mismatched_location_does_not_stop_sibling_blocks() {
        let xml = document(&[timeslice(
            "2024-02-12T07:00:00",
            &[location("ZH", 3, Some("Elders")), location("NH", 1, Some("Hier"))],
        )]);
        let result = extractor().extract_str(&xml);
        assert_eq!(result.severity, 1);
        assert_eq!(result.messages, vec!["Hier"]);
    }

    #[test]
    fn test_status_before_location_id_is_still_counted() {
        let xml = document(&[timeslice(
            "2024-02-12T07:00:00",
            &["<location><location_warning_status>2</location_warning_status>\
               <location_id>ZH</location_id>\
               <text><text_data>Te laat</text_data></text></location>"
                .to_string()],
        )]);
        let result = extractor().extract_str(&xml);
        assert_eq!(result.severity, 2);
        assert!(result.messages.is_empty(), "text after a foreign location_id is not read");
    }

    #[test]
    fn test_only_first_text_after_status_is_attributed() {
        let xml = document(&[timeslice(
            "2024-02-12T07:00:00",
            &["<location><location_id>NH</location_id>\
               <location_warning_status>2</location_warning_status>\
               <text><text_data>Eerste</text_data></text>\
               <text><text_data>Tweede</text_data></text></location>"
                .to_string()],
        )]);
        assert_eq!(extractor().extract_str(&xml).messages, vec!["Eerste"]);
    }

    #[test]
    fn test_empty_text_data_is_skipped() {
        let xml = document(&[timeslice(
            "2024-02-12T07:00:00",
            &["<location><location_id>NH</location_id>\
               <location_warning_status>1</location_warning_status>\
               <text><text_data/><text_data>  </text_data><text_data>Mist</text_data></text></location>"
                .to_string()],
        )]);
        let result = extractor().extract_str(&xml);
        assert_eq!(result.messages, vec!["Mist"]);
        assert_eq!(result.start_time, Some(at(7)));
    }

    #[test]
    fn test_end_time_follows_document_order_not_chronology() {
        let xml = document(&[
            timeslice("2024-02-12T10:00:00", &[location("NH", 1, Some("Later"))]),
            timeslice("2024-02-12T08:00:00", &[location("NH", 1, Some("Eerder"))]),
        ]);
        let result = extractor().extract_str(&xml);
        assert_eq!(result.start_time, Some(at(10)));
        assert_eq!(result.end_time, Some(at(8)));
    }

    #[test]
    fn test_unreadable_status_is_skipped() {
        let xml = document(&[timeslice(
            "2024-02-12T07:00:00",
            &["<location><location_id>NH</location_id>\
               <location_warning_status>oranje</location_warning_status>\
               <text><text_data>x</text_data></text></location>"
                .to_string()],
        )]);
        let result = extractor().extract_str(&xml);
        assert_eq!(result.severity, 0);
        assert!(result.messages.is_empty());
    }

    #[test]
    fn test_malformed_document_yields_no_data() {
        let result = extractor().extract_str("<report><data>");
        assert_eq!(result.severity, 0);
        assert_eq!(result.rendered_text, TextConfig::default().no_data);
    }

    #[test]
    fn test_parse_timestamp_formats() {
        assert_eq!(parse_timestamp("2024-02-12T07:00:00"), Some(at(7)));
        assert_eq!(parse_timestamp("2024-02-12T07:00:00+01:00"), Some(at(7)));
        assert_eq!(parse_timestamp("2024-02-12T07:00:00Z"), Some(at(7)));
        assert_eq!(parse_timestamp("2024-02-12T07:00"), Some(at(7)));
        assert_eq!(parse_timestamp("morgen"), None);
    }
}
