//! Table detection from painted ruling lines (Lattice mode algorithm).
//!
//! Horizontal and vertical segments are merged into rulings, rulings that
//! touch are grouped into connected grids, and every grid becomes a table.
//! A grid cell whose left or top boundary is not drawn is part of a merged
//! cell; its text goes to the cell that owns the merge and the cell itself
//! is reported as not present.

use std::collections::HashSet;

use crate::model::{DetectionStrategy, Rect, Table};

use super::layout::{group_spans_into_lines, Segment, TextSpan};

/// A merged horizontal or vertical line.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Ruling {
    /// Y for horizontal rulings, X for vertical ones
    pos: f32,
    start: f32,
    end: f32,
}

impl Ruling {
    fn covers(&self, from: f32, to: f32, tolerance: f32) -> bool {
        self.start <= from + tolerance && self.end >= to - tolerance
    }
}

/// Union-find over ruling indexes.
struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
        }
    }

    fn find(&mut self, mut i: usize) -> usize {
        while self.parent[i] != i {
            self.parent[i] = self.parent[self.parent[i]];
            i = self.parent[i];
        }
        i
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent[rb] = ra;
        }
    }
}

/// A ruled grid: column edges left to right, row edges top to bottom.
#[derive(Debug, Clone)]
struct Grid {
    xs: Vec<f32>,
    ys: Vec<f32>,
    horizontals: Vec<Ruling>,
    verticals: Vec<Ruling>,
}

/// Detects tables drawn with ruling lines.
pub struct LatticeDetector {
    tolerance: f32,
}

impl LatticeDetector {
    /// Create a detector that snaps lines within `tolerance` points.
    pub fn new(tolerance: f32) -> Self {
        Self {
            tolerance: tolerance.max(0.1),
        }
    }

    /// Detect ruled tables, top to bottom.
    ///
    /// Returns the tables and the indexes of spans placed into them.
    pub fn detect(&self, spans: &[TextSpan], segments: &[Segment]) -> (Vec<Table>, HashSet<usize>) {
        let mut used = HashSet::new();
        let grids = self.find_grids(segments);
        log::debug!("LatticeDetector: {} ruled grids", grids.len());

        let mut tables = Vec::new();
        for grid in grids {
            let table = self.fill_grid(&grid, spans, &mut used);
            tables.push(table);
        }
        (tables, used)
    }

    fn find_grids(&self, segments: &[Segment]) -> Vec<Grid> {
        let tol = self.tolerance;
        let axis_tol = 1.0;

        let horizontals = merge_collinear(
            segments
                .iter()
                .filter(|s| s.is_horizontal(axis_tol))
                .map(|s| Ruling {
                    pos: (s.y0 + s.y1) / 2.0,
                    start: s.x0.min(s.x1),
                    end: s.x0.max(s.x1),
                })
                .collect(),
            tol,
        );
        let verticals = merge_collinear(
            segments
                .iter()
                .filter(|s| s.is_vertical(axis_tol))
                .map(|s| Ruling {
                    pos: (s.x0 + s.x1) / 2.0,
                    start: s.y0.min(s.y1),
                    end: s.y0.max(s.y1),
                })
                .collect(),
            tol,
        );
        log::debug!(
            "LatticeDetector: {} horizontal, {} vertical rulings",
            horizontals.len(),
            verticals.len()
        );

        if horizontals.len() < 2 || verticals.len() < 2 {
            return vec![];
        }

        // Horizontals take indexes 0..h, verticals h..h+v
        let h_count = horizontals.len();
        let mut sets = DisjointSet::new(h_count + verticals.len());
        for (hi, h) in horizontals.iter().enumerate() {
            for (vi, v) in verticals.iter().enumerate() {
                let crosses = v.pos >= h.start - tol
                    && v.pos <= h.end + tol
                    && h.pos >= v.start - tol
                    && h.pos <= v.end + tol;
                if crosses {
                    sets.union(hi, h_count + vi);
                }
            }
        }

        let mut roots: Vec<usize> = Vec::new();
        let mut grids = Vec::new();
        for i in 0..h_count + verticals.len() {
            let root = sets.find(i);
            if roots.contains(&root) {
                continue;
            }
            roots.push(root);

            let hs: Vec<Ruling> = horizontals
                .iter()
                .enumerate()
                .filter(|(hi, _)| sets.find(*hi) == root)
                .map(|(_, r)| *r)
                .collect();
            let vs: Vec<Ruling> = verticals
                .iter()
                .enumerate()
                .filter(|(vi, _)| sets.find(h_count + *vi) == root)
                .map(|(_, r)| *r)
                .collect();

            let xs = cluster_positions(vs.iter().map(|r| r.pos).collect(), tol);
            let mut ys = cluster_positions(hs.iter().map(|r| r.pos).collect(), tol);
            ys.reverse();

            let cells = xs.len().saturating_sub(1) * ys.len().saturating_sub(1);
            if cells < 2 {
                continue;
            }
            grids.push(Grid {
                xs,
                ys,
                horizontals: hs,
                verticals: vs,
            });
        }

        grids.sort_by(|a, b| {
            b.ys[0]
                .partial_cmp(&a.ys[0])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        grids
    }

    fn has_vertical(&self, grid: &Grid, x: f32, bottom: f32, top: f32) -> bool {
        let tol = self.tolerance;
        grid.verticals
            .iter()
            .any(|v| (v.pos - x).abs() <= tol && v.covers(bottom, top, tol))
    }

    fn has_horizontal(&self, grid: &Grid, y: f32, left: f32, right: f32) -> bool {
        let tol = self.tolerance;
        grid.horizontals
            .iter()
            .any(|h| (h.pos - y).abs() <= tol && h.covers(left, right, tol))
    }

    /// Whether grid cell (row, col) starts a cell rather than continuing one.
    fn is_present(&self, grid: &Grid, row: usize, col: usize) -> bool {
        let (left, right) = (grid.xs[col], grid.xs[col + 1]);
        let (top, bottom) = (grid.ys[row], grid.ys[row + 1]);
        let has_left = col == 0 || self.has_vertical(grid, left, bottom, top);
        let has_top = row == 0 || self.has_horizontal(grid, top, left, right);
        has_left && has_top
    }

    fn fill_grid(&self, grid: &Grid, spans: &[TextSpan], used: &mut HashSet<usize>) -> Table {
        let rows = grid.ys.len() - 1;
        let cols = grid.xs.len() - 1;

        let mut present = vec![vec![false; cols]; rows];
        let mut left_edges = vec![vec![false; cols]; rows];
        for r in 0..rows {
            for c in 0..cols {
                present[r][c] = self.is_present(grid, r, c);
                left_edges[r][c] = c == 0
                    || self.has_vertical(grid, grid.xs[c], grid.ys[r + 1], grid.ys[r]);
            }
        }

        let bbox = Rect::new(
            grid.xs[0],
            grid.ys[rows],
            grid.xs[cols],
            grid.ys[0],
        );

        let mut contents: Vec<Vec<Vec<TextSpan>>> = vec![vec![Vec::new(); cols]; rows];
        for (i, span) in spans.iter().enumerate() {
            if used.contains(&i) {
                continue;
            }
            let (ax, ay) = span.anchor();
            if !bbox.contains(ax, ay) {
                continue;
            }
            let Some(col) = (0..cols).find(|&c| ax >= grid.xs[c] && ax <= grid.xs[c + 1]) else {
                continue;
            };
            let Some(row) = (0..rows).find(|&r| ay <= grid.ys[r] && ay >= grid.ys[r + 1]) else {
                continue;
            };
            let (r, c) = self.owner(&present, &left_edges, row, col);
            contents[r][c].push(span.clone());
            used.insert(i);
        }

        let cells = (0..rows)
            .map(|r| {
                (0..cols)
                    .map(|c| {
                        if present[r][c] {
                            Some(cell_text(std::mem::take(&mut contents[r][c])))
                        } else {
                            None
                        }
                    })
                    .collect()
            })
            .collect();

        Table::new(cells, DetectionStrategy::Lattice).with_bbox(bbox)
    }

    /// Walk to the cell that owns a merge: a missing left edge merges with
    /// the neighbour on the left, otherwise the missing top edge merges with
    /// the cell above. The top-left grid cell is always present.
    fn owner(
        &self,
        present: &[Vec<bool>],
        left_edges: &[Vec<bool>],
        mut row: usize,
        mut col: usize,
    ) -> (usize, usize) {
        while !present[row][col] {
            if !left_edges[row][col] && col > 0 {
                col -= 1;
            } else if row > 0 {
                row -= 1;
            } else {
                break;
            }
        }
        (row, col)
    }
}

impl Default for LatticeDetector {
    fn default() -> Self {
        Self::new(3.0)
    }
}

/// Merge rulings that lie on the same line and overlap or touch.
fn merge_collinear(mut rulings: Vec<Ruling>, tolerance: f32) -> Vec<Ruling> {
    rulings.sort_by(|a, b| {
        a.pos
            .partial_cmp(&b.pos)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.start.partial_cmp(&b.start).unwrap_or(std::cmp::Ordering::Equal))
    });

    let mut merged: Vec<Ruling> = Vec::new();
    for ruling in rulings {
        let joined = merged.iter_mut().rev().find(|m| {
            (m.pos - ruling.pos).abs() <= tolerance
                && ruling.start <= m.end + tolerance
                && ruling.end >= m.start - tolerance
        });
        match joined {
            Some(m) => {
                m.start = m.start.min(ruling.start);
                m.end = m.end.max(ruling.end);
            }
            None => merged.push(ruling),
        }
    }
    merged
}

/// Cluster positions within `tolerance` and return the cluster means, ascending.
fn cluster_positions(mut positions: Vec<f32>, tolerance: f32) -> Vec<f32> {
    positions.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let mut clusters: Vec<Vec<f32>> = Vec::new();
    for p in positions {
        match clusters.last_mut() {
            Some(cluster) if cluster.last().is_some_and(|last| p - last <= tolerance) => {
                cluster.push(p)
            }
            _ => clusters.push(vec![p]),
        }
    }
    clusters
        .iter()
        .map(|c| c.iter().sum::<f32>() / c.len() as f32)
        .collect()
}

/// Join a cell's spans line by line in reading order.
fn cell_text(spans: Vec<TextSpan>) -> String {
    group_spans_into_lines(spans)
        .iter()
        .map(|line| line.text())
        .collect::<Vec<_>>()
        .join(" ")
}
