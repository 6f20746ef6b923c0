use picword_cache::Atom;

/// Column headers of the results file, in order.
pub const RESULTS_HEADER: [&str; 7] = [
    "trial", "image1", "image2", "image3", "target", "response", "speaker",
];

/// Width each results column is right-aligned to.
const COLUMN_WIDTH: usize = 10;

/// Where a trial currently is in its strictly sequential steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialStep {
    Started,
    Presenting,
    LoadingAudio,
    AwaitingResponse,
    Logged,
    Skipped,
}

/// One answered trial, as written to the results file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrialRecord {
    /// 1-based trial number.
    pub trial: usize,
    pub images: [Atom; 3],
    pub target: Atom,
    pub response: Atom,
    pub speaker: Atom,
}

impl TrialRecord {
    pub fn row(&self) -> String {
        let trial = self.trial.to_string();
        format_row([
            trial.as_str(),
            &*self.images[0],
            &*self.images[1],
            &*self.images[2],
            &*self.target,
            &*self.response,
            &*self.speaker,
        ])
    }

    pub fn is_correct(&self) -> bool {
        self.response == self.target
    }
}

/// Formats seven fields as one fixed-width, newline-terminated row.
pub fn format_row(fields: [&str; 7]) -> String {
    let mut row = fields
        .iter()
        .map(|field| format!("{field:>width$}", width = COLUMN_WIDTH))
        .collect::<Vec<_>>()
        .join(" ");
    row.push('\n');
    row
}

pub fn header_row() -> String {
    format_row(RESULTS_HEADER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_keeps_column_order() {
        let record = TrialRecord {
            trial: 1,
            images: ["dog".into(), "bird".into(), "cat".into()],
            target: "cat".into(),
            response: "cat".into(),
            speaker: "t1".into(),
        };
        let row = record.row();
        assert_eq!(
            row.split_whitespace().collect::<Vec<_>>(),
            ["1", "dog", "bird", "cat", "cat", "cat", "t1"]
        );
        assert!(record.is_correct());
    }

    #[test]
    fn columns_are_right_aligned_to_ten() {
        let row = header_row();
        assert_eq!(
            row,
            "     trial     image1     image2     image3     target   response    speaker\n"
        );
    }

    #[test]
    fn long_fields_are_not_truncated() {
        let row = format_row(["1", "hippopotamus", "b", "c", "d", "e", "f"]);
        assert!(row.contains("hippopotamus"));
    }
}
