/// Operator-facing text for a warning result.

use crate::config::TextConfig;
use chrono::{Datelike, NaiveDateTime, Timelike};

#[derive(Debug, Clone)]
pub struct Renderer {
    /// Seven names, Monday first.
    weekdays: Vec<String>,
    text: TextConfig,
}

impl Renderer {
    pub fn new(weekdays: Vec<String>, text: TextConfig) -> Self {
        Renderer { weekdays, text }
    }

    pub fn no_data(&self) -> &str {
        &self.text.no_data
    }

    /// `"<from> <weekday> <hour>:00 <until> <weekday> <hour+1>:00"`.
    ///
    /// The end hour is exclusive: a warning in the 23:00 timeslice runs
    /// "until 24:00" of that same day.
    pub fn header(&self, start: NaiveDateTime, end: NaiveDateTime) -> String {
        format!(
            "{} {} {}:00 {} {} {}:00",
            self.text.from_label,
            self.weekday(start),
            start.hour(),
            self.text.until_label,
            self.weekday(end),
            end.hour() + 1
        )
    }

    /// Header line (when a window exists) followed by one line per message.
    pub fn render(
        &self,
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
        messages: &[String],
    ) -> String {
        let mut text = String::new();

        if let Some(start) = start {
            text.push_str(&self.header(start, end.unwrap_or(start)));
            text.push('\n');
        }
        text.push_str(&messages.join("\n"));

        if text.is_empty() {
            self.text.no_warnings.clone()
        } else {
            text
        }
    }

    fn weekday(&self, at: NaiveDateTime) -> &str {
        let index = at.weekday().num_days_from_monday() as usize;
        self.weekdays.get(index).map(String::as_str).unwrap_or("?")
    }
}
