//! Table detection using text position analysis (Stream mode algorithm).
//!
//! Detects tables by analyzing text alignment patterns without relying on
//! graphical lines. [`detect_tables`] runs ruled-grid detection first and
//! hands the remaining spans to the stream detector.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::model::{DetectionStrategy, Rect, Table};

use super::lattice::LatticeDetector;
use super::layout::{PageLayout, TextSpan};

/// A detected table region with its content.
#[derive(Debug, Clone)]
pub struct DetectedTable {
    /// Starting Y coordinate (top of table, in PDF coords)
    pub top_y: f32,
    /// Ending Y coordinate (bottom of table)
    pub bottom_y: f32,
    /// Left X boundary
    pub left_x: f32,
    /// Right X boundary
    pub right_x: f32,
    /// Detected column boundaries (X coordinates)
    pub columns: Vec<f32>,
    /// Rows of text spans grouped by Y position
    pub rows: Vec<TableRowData>,
}

/// A row of text spans in a table.
#[derive(Debug, Clone)]
pub struct TableRowData {
    /// Y position of this row
    pub y: f32,
    /// Spans in this row, sorted by X
    pub spans: Vec<TextSpan>,
}

/// Table detector configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableDetectorConfig {
    /// Minimum number of rows to consider as table
    pub min_rows: usize,
    /// Minimum number of columns to consider as table
    pub min_columns: usize,
    /// Maximum number of columns (above this, likely word-level splitting)
    pub max_columns: usize,
    /// Y tolerance for grouping spans into rows (fraction of font size)
    pub y_tolerance_factor: f32,
    /// Minimum column alignment ratio (0.0-1.0)
    pub min_alignment_ratio: f32,
    /// Minimum gap between columns (points)
    pub min_column_gap: f32,
    /// Detect grids drawn with ruling lines before text-aligned tables
    pub use_ruling_lines: bool,
    /// Snap distance for joining ruling lines (points)
    pub ruling_tolerance: f32,
}

impl Default for TableDetectorConfig {
    fn default() -> Self {
        Self {
            min_rows: 2,
            min_columns: 2,
            max_columns: 6,
            y_tolerance_factor: 0.4,
            min_alignment_ratio: 0.3,
            min_column_gap: 15.0,
            use_ruling_lines: true,
            ruling_tolerance: 3.0,
        }
    }
}

/// Detect every table on a page: ruled grids first (top to bottom), then
/// text-aligned tables among the spans no grid claimed (top to bottom).
pub fn detect_tables(layout: &PageLayout, config: &TableDetectorConfig) -> Vec<Table> {
    let mut tables = Vec::new();
    let mut free_spans = layout.spans.clone();

    if config.use_ruling_lines && !layout.segments.is_empty() {
        let lattice = LatticeDetector::new(config.ruling_tolerance);
        let (ruled, used) = lattice.detect(&layout.spans, &layout.segments);
        log::debug!("detect_tables: {} ruled tables", ruled.len());
        tables.extend(ruled);
        free_spans = layout
            .spans
            .iter()
            .enumerate()
            .filter(|(i, _)| !used.contains(i))
            .map(|(_, span)| span.clone())
            .collect();
    }

    let detector = TableDetector::with_config(config.clone());
    let (detected, _) = detector.detect(free_spans);
    log::debug!("detect_tables: {} text-aligned tables", detected.len());
    tables.extend(detected.iter().map(|d| detector.to_table_model(d)));

    tables
}

/// Detects tables in a list of text spans.
pub struct TableDetector {
    config: TableDetectorConfig,
}

impl TableDetector {
    /// Create a new table detector with default configuration.
    pub fn new() -> Self {
        Self {
            config: TableDetectorConfig::default(),
        }
    }

    /// Create a new table detector with custom configuration.
    pub fn with_config(config: TableDetectorConfig) -> Self {
        Self { config }
    }

    /// Detect tables in the given spans.
    ///
    /// Returns detected tables and the spans that were NOT part of tables.
    pub fn detect(&self, spans: Vec<TextSpan>) -> (Vec<DetectedTable>, Vec<TextSpan>) {
        log::debug!("TableDetector: starting with {} spans", spans.len());

        if spans.len() < self.config.min_rows * self.config.min_columns {
            log::debug!(
                "TableDetector: not enough spans ({} < {})",
                spans.len(),
                self.config.min_rows * self.config.min_columns
            );
            return (vec![], spans);
        }

        // Step 1: Group spans into rows by Y position
        let rows = self.group_into_rows(&spans);
        log::debug!("TableDetector: grouped into {} rows", rows.len());

        if rows.len() < self.config.min_rows {
            return (vec![], spans);
        }

        // Step 2: Detect column boundaries from text edges
        let columns = self.detect_columns(&rows);
        log::debug!(
            "TableDetector: detected {} columns at positions: {:?}",
            columns.len(),
            columns
        );

        if columns.len() < self.config.min_columns {
            return (vec![], spans);
        }

        // Step 3: Find table regions (contiguous rows with consistent column alignment)
        let table_regions = self.find_table_regions(&rows, &columns);
        log::debug!("TableDetector: found {} table regions", table_regions.len());

        if table_regions.is_empty() {
            return (vec![], spans);
        }

        // Step 4: Convert regions to detected tables
        let mut detected_tables = Vec::new();
        let mut used_span_indices: HashSet<usize> = HashSet::new();

        for (start_row, end_row) in table_regions {
            let table_rows: Vec<TableRowData> = rows[start_row..=end_row].to_vec();

            if table_rows.is_empty() {
                continue;
            }

            let top_y = table_rows.first().map(|r| r.y).unwrap_or(0.0);
            let bottom_y = table_rows.last().map(|r| r.y).unwrap_or(0.0);
            let left_x = table_rows
                .iter()
                .flat_map(|r| r.spans.iter())
                .map(|s| s.x)
                .fold(f32::MAX, f32::min);
            let right_x = table_rows
                .iter()
                .flat_map(|r| r.spans.iter())
                .map(|s| s.right())
                .fold(f32::MIN, f32::max);

            // Re-detect columns for this specific table region
            let table_columns = self.detect_columns(&table_rows);

            if table_columns.len() < self.config.min_columns {
                continue;
            }

            // Reject tables with too many columns (likely word-level splitting)
            if table_columns.len() > self.config.max_columns {
                log::debug!(
                    "TableDetector: skipping region, too many columns ({} > {})",
                    table_columns.len(),
                    self.config.max_columns
                );
                continue;
            }

            if self.is_list_pattern(&table_rows, &table_columns) {
                log::debug!("TableDetector: skipping region, detected as list pattern");
                continue;
            }

            // Mark spans as used
            for row in &table_rows {
                for span in &row.spans {
                    for (i, orig_span) in spans.iter().enumerate() {
                        if (orig_span.x - span.x).abs() < 0.1
                            && (orig_span.y - span.y).abs() < 0.1
                            && orig_span.text == span.text
                        {
                            used_span_indices.insert(i);
                        }
                    }
                }
            }

            detected_tables.push(DetectedTable {
                top_y,
                bottom_y,
                left_x,
                right_x,
                columns: table_columns,
                rows: table_rows,
            });
        }

        let unused_spans: Vec<TextSpan> = spans
            .into_iter()
            .enumerate()
            .filter(|(i, _)| !used_span_indices.contains(i))
            .map(|(_, span)| span)
            .collect();

        (detected_tables, unused_spans)
    }

    /// Group spans into rows by Y position.
    fn group_into_rows(&self, spans: &[TextSpan]) -> Vec<TableRowData> {
        if spans.is_empty() {
            return vec![];
        }

        // Sort by Y (descending for PDF coords) then X
        let mut sorted_spans = spans.to_vec();
        sorted_spans.sort_by(|a, b| {
            let y_cmp = b.y.partial_cmp(&a.y).unwrap_or(Ordering::Equal);
            if y_cmp == Ordering::Equal {
                a.x.partial_cmp(&b.x).unwrap_or(Ordering::Equal)
            } else {
                y_cmp
            }
        });

        let mut rows: Vec<TableRowData> = Vec::new();
        let mut current_row_spans: Vec<TextSpan> = Vec::new();
        let mut current_y: Option<f32> = None;

        for span in sorted_spans {
            let y_tolerance = span.font_size * self.config.y_tolerance_factor;

            match current_y {
                Some(y) if (span.y - y).abs() <= y_tolerance => {
                    current_row_spans.push(span);
                }
                _ => {
                    if !current_row_spans.is_empty() {
                        rows.push(row_from_spans(std::mem::take(&mut current_row_spans)));
                    }
                    current_y = Some(span.y);
                    current_row_spans.push(span);
                }
            }
        }

        if !current_row_spans.is_empty() {
            rows.push(row_from_spans(current_row_spans));
        }

        rows
    }

    /// Detect column boundaries from text edges.
    ///
    /// Rows with two or more spans vote for the left edges they contain;
    /// edges seen in enough rows become column starts. Falls back to
    /// counting every span when few rows have multiple spans.
    fn detect_columns(&self, rows: &[TableRowData]) -> Vec<f32> {
        if rows.is_empty() {
            return vec![];
        }

        let multi_span_rows: Vec<&TableRowData> =
            rows.iter().filter(|r| r.spans.len() >= 2).collect();

        if multi_span_rows.len() < self.config.min_rows {
            return self.detect_columns_simple(rows);
        }

        let mut edge_counts: HashMap<i32, usize> = HashMap::new();
        for row in &multi_span_rows {
            // Count each bucket only once per row
            let row_buckets: HashSet<i32> = row.spans.iter().map(|s| edge_bucket(s.x)).collect();
            for bucket in row_buckets {
                *edge_counts.entry(bucket).or_insert(0) += 1;
            }
        }

        let min_occurrences =
            ((multi_span_rows.len() as f32 * self.config.min_alignment_ratio) as usize).max(2);

        log::debug!(
            "TableDetector: min_occurrences = {}, edge_counts = {:?}",
            min_occurrences,
            edge_counts
        );

        self.merge_edges(&edge_counts, min_occurrences)
    }

    /// Simpler column detection for when few rows have multiple spans.
    fn detect_columns_simple(&self, rows: &[TableRowData]) -> Vec<f32> {
        let mut edge_counts: HashMap<i32, usize> = HashMap::new();
        for span in rows.iter().flat_map(|r| r.spans.iter()) {
            *edge_counts.entry(edge_bucket(span.x)).or_insert(0) += 1;
        }

        let min_occurrences =
            ((rows.len() as f32 * self.config.min_alignment_ratio) as usize).max(2);
        self.merge_edges(&edge_counts, min_occurrences)
    }

    /// Keep frequent edges and drop those closer than the minimum column gap.
    fn merge_edges(&self, edge_counts: &HashMap<i32, usize>, min_occurrences: usize) -> Vec<f32> {
        let mut column_edges: Vec<f32> = edge_counts
            .iter()
            .filter(|(_, count)| **count >= min_occurrences)
            .map(|(bucket, _)| *bucket as f32 * EDGE_BUCKET)
            .collect();
        column_edges.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));

        let mut merged_edges: Vec<f32> = Vec::new();
        for edge in column_edges {
            match merged_edges.last() {
                Some(&last) if edge - last < self.config.min_column_gap => {}
                _ => merged_edges.push(edge),
            }
        }
        merged_edges
    }

    /// Find contiguous row regions that form tables.
    fn find_table_regions(&self, rows: &[TableRowData], columns: &[f32]) -> Vec<(usize, usize)> {
        if rows.is_empty() || columns.len() < self.config.min_columns {
            return vec![];
        }

        let mut regions: Vec<(usize, usize)> = Vec::new();
        let mut current_start: Option<usize> = None;
        let mut consecutive_table_rows = 0;

        for (i, row) in rows.iter().enumerate() {
            let alignment_score = self.calculate_alignment_score(row, columns);

            if alignment_score >= self.config.min_alignment_ratio {
                if current_start.is_none() {
                    current_start = Some(i);
                }
                consecutive_table_rows += 1;
            } else {
                if let Some(start) = current_start {
                    if consecutive_table_rows >= self.config.min_rows {
                        regions.push((start, i - 1));
                    }
                }
                current_start = None;
                consecutive_table_rows = 0;
            }
        }

        if let Some(start) = current_start {
            if consecutive_table_rows >= self.config.min_rows {
                regions.push((start, rows.len() - 1));
            }
        }

        regions
    }

    /// Calculate how well a row aligns with the detected columns.
    fn calculate_alignment_score(&self, row: &TableRowData, columns: &[f32]) -> f32 {
        if row.spans.is_empty() || columns.is_empty() {
            return 0.0;
        }

        let tolerance = 5.0;
        let aligned_spans = row
            .spans
            .iter()
            .filter(|span| columns.iter().any(|col| (span.x - col).abs() <= tolerance))
            .count();

        aligned_spans as f32 / row.spans.len() as f32
    }

    /// Convert a detected table to the model [`Table`].
    ///
    /// Every column slot exists in a text-aligned grid, so each cell is
    /// present; a slot without text is an empty cell.
    pub fn to_table_model(&self, detected: &DetectedTable) -> Table {
        let columns = &detected.columns;

        let cells = detected
            .rows
            .iter()
            .map(|row_data| {
                let mut cell_contents: Vec<Vec<&str>> = vec![Vec::new(); columns.len()];

                // Assign each span to exactly one column, by its left edge
                for span in &row_data.spans {
                    let col_idx = self.find_column_for_span(span.x, columns, detected.right_x);
                    if let Some(slot) = cell_contents.get_mut(col_idx) {
                        slot.push(span.text.trim());
                    }
                }

                cell_contents
                    .into_iter()
                    .map(|contents| Some(contents.join(" ")))
                    .collect()
            })
            .collect();

        Table::new(cells, DetectionStrategy::Stream).with_bbox(Rect::new(
            detected.left_x,
            detected.bottom_y,
            detected.right_x,
            detected.top_y,
        ))
    }

    /// Find which column a span belongs to based on its X position.
    fn find_column_for_span(&self, span_x: f32, columns: &[f32], right_x: f32) -> usize {
        if columns.is_empty() {
            return 0;
        }

        // Allow some tolerance (10pt) for spans slightly before column start
        for (i, &col_start) in columns.iter().enumerate() {
            let col_end = columns.get(i + 1).copied().unwrap_or(right_x + 100.0);
            if span_x >= col_start - 10.0 && span_x < col_end - 10.0 {
                return i;
            }
        }

        // If no exact match, find the closest column
        columns
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                (span_x - **a)
                    .abs()
                    .partial_cmp(&(span_x - **b).abs())
                    .unwrap_or(Ordering::Equal)
            })
            .map(|(i, _)| i)
            .unwrap_or(0)
    }

    /// Check if detected table rows actually represent a numbered or bulleted list.
    ///
    /// When a PDF has a numbered list like "1. Item", the number and text often
    /// become separate spans at different X positions, which looks like a multi-column
    /// table to the detector. This method catches that false positive.
    fn is_list_pattern(&self, rows: &[TableRowData], columns: &[f32]) -> bool {
        if columns.len() < 2 || rows.is_empty() {
            return false;
        }

        let mut bullet_count = 0;
        let mut number_count = 0;

        for row in rows {
            let first_span = row
                .spans
                .iter()
                .min_by(|a, b| a.x.partial_cmp(&b.x).unwrap_or(Ordering::Equal));

            if let Some(span) = first_span {
                let text = span.text.trim();
                if is_bullet_marker(text) {
                    bullet_count += 1;
                } else if is_number_marker(text) {
                    number_count += 1;
                }
            }
        }

        let bullet_ratio = bullet_count as f32 / rows.len() as f32;
        let total_ratio = (bullet_count + number_count) as f32 / rows.len() as f32;
        log::debug!(
            "TableDetector: list markers: bullets={}, numbers={}, total rows={}",
            bullet_count,
            number_count,
            rows.len()
        );

        // Bullet markers (•, -, etc.) are almost never real table data
        if bullet_ratio >= 0.5 {
            return true;
        }

        // For numbered markers, only reject 2-column tables to avoid
        // false-negatives on real tables with numbered first columns
        columns.len() == 2 && total_ratio >= 0.5
    }
}

impl Default for TableDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// Width of the buckets left edges are grouped into (points).
const EDGE_BUCKET: f32 = 5.0;

fn edge_bucket(x: f32) -> i32 {
    (x / EDGE_BUCKET).round() as i32
}

fn row_from_spans(spans: Vec<TextSpan>) -> TableRowData {
    let y = spans.iter().map(|s| s.y).sum::<f32>() / spans.len().max(1) as f32;
    TableRowData { y, spans }
}

/// Check if text is a bullet marker (•, -, etc.).
fn is_bullet_marker(text: &str) -> bool {
    matches!(
        text.trim(),
        "-" | "–" | "—" | "•" | "·" | "*" | "○" | "▪" | "◦" | "▸" | "▹" | "►" | "■" | "●" | "※" | "□" | "◆" | "◇" | "▶" | "▷" | "☞" | "➤" | "➜"
    )
}

/// Check if text is a number-style list marker (1., 2), a., etc.).
fn is_number_marker(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return false;
    }

    // Remove internal whitespace for pattern matching (handles "1 .")
    let cleaned: String = trimmed.chars().filter(|c| !c.is_whitespace()).collect();

    // Digits followed by "." or ")"
    if let Some(pos) = cleaned.find(|c: char| !c.is_ascii_digit()) {
        let (prefix, suffix) = cleaned.split_at(pos);
        if !prefix.is_empty() && (suffix == "." || suffix == ")") {
            return true;
        }
    }

    // Just a bare number
    if cleaned.parse::<u32>().is_ok() {
        return true;
    }

    // Letter marker: "a.", "B)"
    let chars: Vec<char> = cleaned.chars().collect();
    chars.len() == 2 && chars[0].is_alphabetic() && (chars[1] == '.' || chars[1] == ')')
}

#[cfg(test)]
fn is_list_marker(text: &str) -> bool {
    is_bullet_marker(text) || is_number_marker(text)
}
