//! Hierarchical watershed classification returned by the worker.

use std::fmt::Write as _;

use serde::Deserialize;

/// Reply sent when the queried point lies outside the covered dataset.
pub const OUTSIDE_DATASET_MESSAGE: &str =
    "Your point is outside the dataset and does not have watershed data available.";

/// Heading of a successful watershed report.
pub const REPORT_HEADING: &str = "Your point is in the following watersheds:";

/// One named hydrologic unit.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HucLevel {
    /// Human-readable unit name.
    pub name: String,
}

/// Up to eight nested hydrologic unit levels, coarsest first.
///
/// Field names follow the worker's JSON (`huc2` … `huc16`,
/// `pointNotInDataset`). Unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatershedStack {
    /// Region.
    pub huc2: Option<HucLevel>,
    /// Subregion.
    pub huc4: Option<HucLevel>,
    /// Basin.
    pub huc6: Option<HucLevel>,
    /// Subbasin.
    pub huc8: Option<HucLevel>,
    /// Watershed.
    pub huc10: Option<HucLevel>,
    /// Subwatershed.
    pub huc12: Option<HucLevel>,
    /// Level 14.
    pub huc14: Option<HucLevel>,
    /// Level 16.
    pub huc16: Option<HucLevel>,
    /// Set when the point falls outside the dataset.
    #[serde(default)]
    pub point_not_in_dataset: bool,
}

impl WatershedStack {
    /// Present levels as `(digits, level)` pairs, coarsest first.
    #[must_use]
    pub fn levels(&self) -> impl Iterator<Item = (u8, &HucLevel)> {
        [
            (2, &self.huc2),
            (4, &self.huc4),
            (6, &self.huc6),
            (8, &self.huc8),
            (10, &self.huc10),
            (12, &self.huc12),
            (14, &self.huc14),
            (16, &self.huc16),
        ]
        .into_iter()
        .filter_map(|(digits, level)| level.as_ref().map(|l| (digits, l)))
    }

    /// Render the multi-line chat reply for this result.
    ///
    /// Absent levels are omitted entirely; the level list sits in a fenced
    /// code block so names line up.
    #[must_use]
    pub fn render_report(&self) -> String {
        if self.point_not_in_dataset {
            return OUTSIDE_DATASET_MESSAGE.to_owned();
        }

        let mut report = format!("{REPORT_HEADING}\n```\n");
        for (digits, level) in self.levels() {
            // Writing into a String cannot fail.
            let _ = writeln!(report, "Level {digits:>2}: {}", level.name);
        }
        report.push_str("```");
        report
    }
}
