//! Layout analysis for PDF pages.
//!
//! Interprets a decoded content stream into positioned text spans and
//! painted line segments, and renders spans in raw (stream) order or in
//! sorted reading order.

use std::cmp::Ordering;

use super::backend::{ContentOp, PdfValue, TextDecoder};

/// Average glyph advance as a fraction of the font size. Glyph widths are
/// not read from font programs, so advances and span widths are estimates.
const AVG_GLYPH_WIDTH: f32 = 0.5;

/// A text span with position and style information.
#[derive(Debug, Clone)]
pub struct TextSpan {
    /// The text content
    pub text: String,
    /// X position (left edge)
    pub x: f32,
    /// Y position (baseline)
    pub y: f32,
    /// Width of the text
    pub width: f32,
    /// Font size in points
    pub font_size: f32,
    /// Font name (resource name, e.g. "F1")
    pub font_name: String,
}

impl TextSpan {
    /// Create a new text span with an estimated width.
    pub fn new(text: String, x: f32, y: f32, font_size: f32, font_name: String) -> Self {
        let width = text.chars().count() as f32 * font_size * AVG_GLYPH_WIDTH;
        Self {
            text,
            x,
            y,
            width,
            font_size,
            font_name,
        }
    }

    /// Right edge.
    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    /// Get the bottom Y coordinate (approximate, based on font size).
    pub fn bottom(&self) -> f32 {
        self.y - self.font_size * 0.2 // Approximate descender
    }

    /// Get the top Y coordinate (approximate, based on font size).
    pub fn top(&self) -> f32 {
        self.y + self.font_size * 0.8 // Approximate ascender
    }

    /// Point used to decide which region a span falls into: the middle of
    /// its first glyph, halfway up the x-height.
    pub fn anchor(&self) -> (f32, f32) {
        let first_glyph = self.font_size * AVG_GLYPH_WIDTH;
        (
            self.x + first_glyph.min(self.width) / 2.0,
            self.y + self.font_size * 0.3,
        )
    }
}

/// A painted straight segment in user space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl Segment {
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn is_horizontal(&self, tolerance: f32) -> bool {
        (self.y1 - self.y0).abs() <= tolerance && (self.x1 - self.x0).abs() > tolerance
    }

    pub fn is_vertical(&self, tolerance: f32) -> bool {
        (self.x1 - self.x0).abs() <= tolerance && (self.y1 - self.y0).abs() > tolerance
    }
}

/// Everything the interpreter recovers from one page.
#[derive(Debug, Clone, Default)]
pub struct PageLayout {
    /// Text spans in content-stream order
    pub spans: Vec<TextSpan>,
    /// Stroked or filled straight segments
    pub segments: Vec<Segment>,
}

impl PageLayout {
    /// Text in content-stream order.
    pub fn raw_text(&self) -> String {
        raw_text(&self.spans)
    }

    /// Text sorted top-to-bottom, left-to-right.
    pub fn sorted_text(&self) -> String {
        sorted_text(&self.spans)
    }
}

/// A text line composed of multiple spans on the same baseline.
#[derive(Debug, Clone)]
pub struct TextLine {
    /// The spans in this line, sorted by X position
    pub spans: Vec<TextSpan>,
    /// Y position (baseline)
    pub y: f32,
    /// Leftmost X position
    pub x: f32,
}

impl TextLine {
    /// Create a new text line from spans.
    pub fn from_spans(mut spans: Vec<TextSpan>) -> Self {
        spans.sort_by(|a, b| a.x.partial_cmp(&b.x).unwrap_or(Ordering::Equal));
        let y = spans.first().map(|s| s.y).unwrap_or(0.0);
        let x = spans.first().map(|s| s.x).unwrap_or(0.0);
        Self { spans, y, x }
    }

    /// Get the combined text of all spans with gap-based spacing.
    pub fn text(&self) -> String {
        let mut result = String::new();
        for (i, span) in self.spans.iter().enumerate() {
            if i > 0 && needs_space(&self.spans[i - 1], span) {
                result.push(' ');
            }
            result.push_str(&span.text);
        }
        result
    }
}

/// Decide whether a space belongs between two spans on the same line.
///
/// No space between two spaceless-script characters (Chinese, Japanese),
/// and none if either side already carries one.
fn needs_space(prev: &TextSpan, curr: &TextSpan) -> bool {
    let prev_ends_with_space = prev.text.ends_with(' ') || prev.text.ends_with('\u{00A0}');
    let curr_starts_with_space = curr.text.starts_with(' ') || curr.text.starts_with('\u{00A0}');
    if prev_ends_with_space || curr_starts_with_space {
        return false;
    }

    let char_count = curr.text.chars().count();
    let avg_char_width = if char_count > 0 && curr.width > 0.0 {
        curr.width / char_count as f32
    } else {
        curr.font_size * AVG_GLYPH_WIDTH
    };

    let gap = curr.x - prev.right();
    // Spans running backwards on the same baseline are separate words too
    let separated = gap > avg_char_width * 0.2 || curr.x < prev.x;
    if !separated {
        return false;
    }

    let prev_is_cjk = prev
        .text
        .chars()
        .last()
        .map(is_spaceless_script_char)
        .unwrap_or(false);
    let curr_is_cjk = curr
        .text
        .chars()
        .next()
        .map(is_spaceless_script_char)
        .unwrap_or(false);
    !(prev_is_cjk && curr_is_cjk)
}

fn same_baseline(a: &TextSpan, b: &TextSpan) -> bool {
    let tolerance = (a.font_size.max(b.font_size) * 0.3).max(1.0);
    (a.y - b.y).abs() <= tolerance
}

/// Render spans in the order they appear in the content stream.
///
/// A baseline change starts a new line.
pub fn raw_text(spans: &[TextSpan]) -> String {
    let mut out = String::new();
    let mut prev: Option<&TextSpan> = None;
    for span in spans {
        if let Some(p) = prev {
            if !same_baseline(p, span) {
                out.push('\n');
            } else if needs_space(p, span) {
                out.push(' ');
            }
        }
        out.push_str(&span.text);
        prev = Some(span);
    }
    if !out.is_empty() {
        out.push('\n');
    }
    out
}

/// Render spans in reading order: lines top to bottom, spans left to right.
pub fn sorted_text(spans: &[TextSpan]) -> String {
    let mut out = String::new();
    for line in group_spans_into_lines(spans.to_vec()) {
        out.push_str(&line.text());
        out.push('\n');
    }
    out
}

/// Y-based line grouping. PDF Y grows upwards, so lines come out top first.
pub fn group_spans_into_lines(mut spans: Vec<TextSpan>) -> Vec<TextLine> {
    if spans.is_empty() {
        return vec![];
    }

    spans.sort_by(|a, b| {
        let y_cmp = b.y.partial_cmp(&a.y).unwrap_or(Ordering::Equal);
        if y_cmp == Ordering::Equal {
            a.x.partial_cmp(&b.x).unwrap_or(Ordering::Equal)
        } else {
            y_cmp
        }
    });

    let mut lines: Vec<TextLine> = Vec::new();
    let mut current_line_spans: Vec<TextSpan> = Vec::new();

    for span in spans {
        let starts_new_line = current_line_spans
            .first()
            .is_some_and(|first| !same_baseline(first, &span));
        if starts_new_line {
            lines.push(TextLine::from_spans(std::mem::take(
                &mut current_line_spans,
            )));
        }
        current_line_spans.push(span);
    }

    if !current_line_spans.is_empty() {
        lines.push(TextLine::from_spans(current_line_spans));
    }

    lines
}

/// A 2D affine transform `[a b c d e f]`, as used by `cm` and `Tm`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub e: f32,
    pub f: f32,
}

impl Default for Matrix {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Matrix {
    pub const IDENTITY: Matrix = Matrix {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    pub fn new(a: f32, b: f32, c: f32, d: f32, e: f32, f: f32) -> Self {
        Self { a, b, c, d, e, f }
    }

    pub fn translation(tx: f32, ty: f32) -> Self {
        Self::new(1.0, 0.0, 0.0, 1.0, tx, ty)
    }

    /// `self × other`: apply `self` first, then `other`.
    pub fn multiply(&self, other: &Matrix) -> Matrix {
        Matrix {
            a: self.a * other.a + self.b * other.c,
            b: self.a * other.b + self.b * other.d,
            c: self.c * other.a + self.d * other.c,
            d: self.c * other.b + self.d * other.d,
            e: self.e * other.a + self.f * other.c + other.e,
            f: self.e * other.b + self.f * other.d + other.f,
        }
    }

    pub fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        (
            self.a * x + self.c * y + self.e,
            self.b * x + self.d * y + self.f,
        )
    }

    /// Length of the transformed unit Y vector.
    pub fn vertical_scale(&self) -> f32 {
        (self.c * self.c + self.d * self.d).sqrt()
    }

    fn from_operands(op: &ContentOp) -> Option<Matrix> {
        Some(Matrix::new(
            op.number(0)?,
            op.number(1)?,
            op.number(2)?,
            op.number(3)?,
            op.number(4)?,
            op.number(5)?,
        ))
    }
}

#[derive(Debug, Clone)]
struct TextState {
    font: Vec<u8>,
    font_size: f32,
    char_spacing: f32,
    word_spacing: f32,
    horizontal_scale: f32,
    leading: f32,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            font: Vec::new(),
            font_size: 12.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            horizontal_scale: 1.0,
            leading: 0.0,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct GraphicsState {
    ctm: Matrix,
    text: TextState,
}

/// Interprets content-stream operations into a [`PageLayout`].
pub struct ContentInterpreter<'a, D: TextDecoder + ?Sized> {
    decoder: &'a D,
    state: GraphicsState,
    stack: Vec<GraphicsState>,
    text_matrix: Matrix,
    line_matrix: Matrix,
    in_text_object: bool,
    path: Vec<Segment>,
    subpath_start: Option<(f32, f32)>,
    current_point: Option<(f32, f32)>,
    layout: PageLayout,
}

impl<'a, D: TextDecoder + ?Sized> ContentInterpreter<'a, D> {
    pub fn new(decoder: &'a D) -> Self {
        Self {
            decoder,
            state: GraphicsState::default(),
            stack: Vec::new(),
            text_matrix: Matrix::IDENTITY,
            line_matrix: Matrix::IDENTITY,
            in_text_object: false,
            path: Vec::new(),
            subpath_start: None,
            current_point: None,
            layout: PageLayout::default(),
        }
    }

    /// Run every operation and return the collected layout.
    pub fn run(mut self, ops: &[ContentOp]) -> PageLayout {
        for op in ops {
            self.step(op);
        }
        self.layout
    }

    fn step(&mut self, op: &ContentOp) {
        match op.operator.as_str() {
            "q" => self.stack.push(self.state.clone()),
            "Q" => {
                if let Some(saved) = self.stack.pop() {
                    self.state = saved;
                }
            }
            "cm" => {
                if let Some(m) = Matrix::from_operands(op) {
                    self.state.ctm = m.multiply(&self.state.ctm);
                }
            }

            "BT" => {
                self.in_text_object = true;
                self.text_matrix = Matrix::IDENTITY;
                self.line_matrix = Matrix::IDENTITY;
            }
            "ET" => self.in_text_object = false,
            "Tf" => {
                if let Some(PdfValue::Name(name)) = op.operands.first() {
                    self.state.text.font = name.clone();
                }
                if let Some(size) = op.number(1) {
                    self.state.text.font_size = size;
                }
            }
            "Tc" => self.state.text.char_spacing = op.number(0).unwrap_or(0.0),
            "Tw" => self.state.text.word_spacing = op.number(0).unwrap_or(0.0),
            "Tz" => self.state.text.horizontal_scale = op.number(0).unwrap_or(100.0) / 100.0,
            "TL" => self.state.text.leading = op.number(0).unwrap_or(0.0),
            "Td" => {
                if let (Some(tx), Some(ty)) = (op.number(0), op.number(1)) {
                    self.move_line(tx, ty);
                }
            }
            "TD" => {
                if let (Some(tx), Some(ty)) = (op.number(0), op.number(1)) {
                    self.state.text.leading = -ty;
                    self.move_line(tx, ty);
                }
            }
            "Tm" => {
                if let Some(m) = Matrix::from_operands(op) {
                    self.text_matrix = m;
                    self.line_matrix = m;
                }
            }
            "T*" => self.next_line(),
            "Tj" => {
                if let Some(PdfValue::Str(bytes)) = op.operands.first() {
                    self.show(&[PdfValue::Str(bytes.clone())]);
                }
            }
            "TJ" => {
                if let Some(PdfValue::Array(items)) = op.operands.first() {
                    self.show(items);
                }
            }
            "'" => {
                self.next_line();
                if let Some(PdfValue::Str(bytes)) = op.operands.first() {
                    self.show(&[PdfValue::Str(bytes.clone())]);
                }
            }
            "\"" => {
                if let Some(aw) = op.number(0) {
                    self.state.text.word_spacing = aw;
                }
                if let Some(ac) = op.number(1) {
                    self.state.text.char_spacing = ac;
                }
                self.next_line();
                if let Some(PdfValue::Str(bytes)) = op.operands.get(2) {
                    self.show(&[PdfValue::Str(bytes.clone())]);
                }
            }

            "m" => {
                if let (Some(x), Some(y)) = (op.number(0), op.number(1)) {
                    let p = self.state.ctm.apply(x, y);
                    self.subpath_start = Some(p);
                    self.current_point = Some(p);
                }
            }
            "l" => {
                if let (Some(x), Some(y)) = (op.number(0), op.number(1)) {
                    let p = self.state.ctm.apply(x, y);
                    if let Some(from) = self.current_point {
                        self.path.push(Segment::new(from.0, from.1, p.0, p.1));
                    }
                    self.current_point = Some(p);
                }
            }
            // Curves never form rulings; only the end point matters.
            "c" | "y" => {
                if let (Some(x), Some(y)) = (op.number(4), op.number(5)) {
                    self.current_point = Some(self.state.ctm.apply(x, y));
                }
            }
            "v" => {
                if let (Some(x), Some(y)) = (op.number(2), op.number(3)) {
                    self.current_point = Some(self.state.ctm.apply(x, y));
                }
            }
            "h" => self.close_subpath(),
            "re" => {
                if let (Some(x), Some(y), Some(w), Some(h)) =
                    (op.number(0), op.number(1), op.number(2), op.number(3))
                {
                    self.add_rectangle(x, y, w, h);
                }
            }
            "s" | "b" | "b*" => {
                self.close_subpath();
                self.paint_path();
            }
            "S" | "f" | "F" | "f*" | "B" | "B*" => self.paint_path(),
            "n" => self.discard_path(),
            _ => {}
        }
    }

    fn move_line(&mut self, tx: f32, ty: f32) {
        self.line_matrix = Matrix::translation(tx, ty).multiply(&self.line_matrix);
        self.text_matrix = self.line_matrix;
    }

    fn next_line(&mut self) {
        // Leading defaults to 0; fall back to the font size so that T*
        // without TL still produces separate lines
        let leading = if self.state.text.leading != 0.0 {
            self.state.text.leading
        } else {
            self.state.text.font_size
        };
        self.move_line(0.0, -leading);
    }

    /// Show strings and kerning adjustments (Tj, TJ, ', ").
    fn show(&mut self, items: &[PdfValue]) {
        if !self.in_text_object {
            return;
        }

        let ts = self.state.text.clone();
        let render = self.text_matrix.multiply(&self.state.ctm);
        let (x, y) = render.apply(0.0, 0.0);
        let effective_size = ts.font_size * render.vertical_scale();

        // Threshold for space detection: 200/1000 of the font size
        let space_threshold = 200.0;
        let mut combined = String::new();

        for item in items {
            match item {
                PdfValue::Str(bytes) => {
                    let decoded = self.decoder.decode(&ts.font, bytes);
                    let mut advance = 0.0;
                    for ch in decoded.chars() {
                        advance += ts.font_size * AVG_GLYPH_WIDTH + ts.char_spacing;
                        if ch == ' ' {
                            advance += ts.word_spacing;
                        }
                    }
                    self.advance(advance * ts.horizontal_scale);
                    combined.push_str(&decoded);
                }
                PdfValue::Integer(_) | PdfValue::Real(_) => {
                    let adjustment = item.as_number().unwrap_or(0.0);
                    self.advance(-adjustment / 1000.0 * ts.font_size * ts.horizontal_scale);
                    // Large negative values indicate word breaks
                    if -adjustment > space_threshold
                        && !combined.is_empty()
                        && !combined.ends_with(' ')
                        && !combined
                            .chars()
                            .last()
                            .is_some_and(is_spaceless_script_char)
                    {
                        combined.push(' ');
                    }
                }
                _ => {}
            }
        }

        if combined.trim().is_empty() {
            return;
        }

        let end = self.text_matrix.multiply(&self.state.ctm).apply(0.0, 0.0);
        let mut span = TextSpan::new(
            combined,
            x,
            y,
            effective_size,
            String::from_utf8_lossy(&ts.font).to_string(),
        );
        let measured = end.0 - x;
        if measured > 0.0 {
            span.width = measured;
        }
        self.layout.spans.push(span);
    }

    fn advance(&mut self, tx: f32) {
        self.text_matrix = Matrix::translation(tx, 0.0).multiply(&self.text_matrix);
    }

    fn close_subpath(&mut self) {
        if let (Some(from), Some(start)) = (self.current_point, self.subpath_start) {
            if from != start {
                self.path.push(Segment::new(from.0, from.1, start.0, start.1));
            }
            self.current_point = Some(start);
        }
    }

    fn add_rectangle(&mut self, x: f32, y: f32, w: f32, h: f32) {
        let corners = [
            self.state.ctm.apply(x, y),
            self.state.ctm.apply(x + w, y),
            self.state.ctm.apply(x + w, y + h),
            self.state.ctm.apply(x, y + h),
        ];
        let xs = corners.iter().map(|p| p.0);
        let ys = corners.iter().map(|p| p.1);
        let min_x = xs.clone().fold(f32::MAX, f32::min);
        let max_x = xs.fold(f32::MIN, f32::max);
        let min_y = ys.clone().fold(f32::MAX, f32::min);
        let max_y = ys.fold(f32::MIN, f32::max);

        // Thin rectangles are how many producers draw rules
        const THIN: f32 = 2.0;
        if max_y - min_y <= THIN {
            let mid = (min_y + max_y) / 2.0;
            self.path.push(Segment::new(min_x, mid, max_x, mid));
        } else if max_x - min_x <= THIN {
            let mid = (min_x + max_x) / 2.0;
            self.path.push(Segment::new(mid, min_y, mid, max_y));
        } else {
            for i in 0..4 {
                let (a, b) = (corners[i], corners[(i + 1) % 4]);
                self.path.push(Segment::new(a.0, a.1, b.0, b.1));
            }
        }
        self.subpath_start = Some(corners[0]);
        self.current_point = Some(corners[0]);
    }

    fn paint_path(&mut self) {
        self.layout.segments.append(&mut self.path);
        self.subpath_start = None;
        self.current_point = None;
    }

    fn discard_path(&mut self) {
        self.path.clear();
        self.subpath_start = None;
        self.current_point = None;
    }
}

/// Interpret a page's operations with the given decoder.
pub fn interpret<D: TextDecoder + ?Sized>(ops: &[ContentOp], decoder: &D) -> PageLayout {
    ContentInterpreter::new(decoder).run(ops)
}

/// Check if character is from a script that doesn't use word spaces.
/// Chinese and Japanese don't use spaces between words, but Korean does.
pub(crate) fn is_spaceless_script_char(c: char) -> bool {
    let code = c as u32;

    // CJK Unified Ideographs (Chinese characters, used in Chinese/Japanese)
    (0x4E00..=0x9FFF).contains(&code)
    // CJK Unified Ideographs Extension A
    || (0x3400..=0x4DBF).contains(&code)
    // CJK Unified Ideographs Extension B-F
    || (0x20000..=0x2EBEF).contains(&code)
    // Hiragana and Katakana (Japanese)
    || (0x3040..=0x30FF).contains(&code)
    // CJK Symbols and Punctuation
    || (0x3000..=0x303F).contains(&code)
}
