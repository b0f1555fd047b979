//! CSV and PDF renderings of the attendance matrix
//!
//! Both formats are built from the same [`ExportRow`]s, so per-employee
//! percentages and hours are identical across formats.

use super::{AttendanceMatrix, EmployeeAttendanceStats};
use std::fmt::Write as _;

/// One employee line of an export
#[derive(Debug, Clone)]
pub struct ExportRow {
    pub cells: Vec<&'static str>,
    pub stats: EmployeeAttendanceStats,
}

/// Column headings after the per-lesson columns
const SUMMARY_HEADERS: [&str; 6] = [
    "Present",
    "Absent",
    "Justified",
    "Percentage",
    "Total hours",
    "Attended hours",
];

pub fn export_rows(matrix: &AttendanceMatrix) -> Vec<ExportRow> {
    matrix
        .roster()
        .iter()
        .map(|entry| ExportRow {
            cells: matrix
                .row(entry.employee_id)
                .into_iter()
                .map(|s| s.code())
                .collect(),
            stats: matrix.employee_stats(entry),
        })
        .collect()
}

/// Hours without a trailing ".0" for whole numbers
pub fn format_hours(hours: f64) -> String {
    if hours.fract() == 0.0 {
        format!("{}", hours as i64)
    } else {
        let s = format!("{:.2}", hours);
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

pub fn format_percentage(percentage: u32) -> String {
    format!("{}%", percentage)
}

fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

/// Render the matrix as CSV
///
/// Text cells are quoted, counts and hours are bare, e.g.
/// `"A","P","P",2,0,0,"100%",8,8`.
pub fn render_csv(matrix: &AttendanceMatrix) -> String {
    let mut out = String::new();

    let mut header = vec![quote("Employee")];
    header.extend(
        matrix
            .lessons()
            .iter()
            .map(|l| quote(&l.date.format("%Y-%m-%d").to_string())),
    );
    header.extend(SUMMARY_HEADERS.iter().map(|h| quote(h)));
    out.push_str(&header.join(","));
    out.push_str("\r\n");

    for row in export_rows(matrix) {
        let s = &row.stats;
        let mut fields = vec![quote(&s.name)];
        fields.extend(row.cells.iter().map(|c| quote(c)));
        fields.push(s.present.to_string());
        fields.push(s.absent.to_string());
        fields.push(s.justified.to_string());
        fields.push(quote(&format_percentage(s.percentage)));
        fields.push(format_hours(s.total_hours));
        fields.push(format_hours(s.attended_hours));
        out.push_str(&fields.join(","));
        out.push_str("\r\n");
    }

    out
}

// =============================================================================
// PDF
// =============================================================================

/// Landscape A4 in points
const PAGE_WIDTH: f64 = 842.0;
const PAGE_HEIGHT: f64 = 595.0;
const MARGIN: f64 = 30.0;
const FONT_SIZE: f64 = 8.0;
const LINE_HEIGHT: f64 = 13.0;
const NAME_COLUMN: f64 = 150.0;
const SUMMARY_COLUMN: f64 = 48.0;
const MIN_LESSON_COLUMN: f64 = 24.0;

/// Positioned text on one page
struct PageText {
    items: Vec<(f64, f64, String)>,
}

impl PageText {
    fn new() -> Self {
        Self { items: Vec::new() }
    }

    fn text(&mut self, x: f64, y: f64, value: impl Into<String>) {
        self.items.push((x, y, value.into()));
    }

    fn content_stream(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for (x, y, value) in &self.items {
            out.extend_from_slice(format!("BT /F1 {} Tf {:.2} {:.2} Td (", FONT_SIZE, x, y).as_bytes());
            out.extend(pdf_string_bytes(value));
            out.extend_from_slice(b") Tj ET\n");
        }
        out
    }
}

/// Latin-1 bytes with PDF string escapes; other characters become '?'
fn pdf_string_bytes(value: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '(' | ')' | '\\' => {
                out.push(b'\\');
                out.push(c as u8);
            }
            c if (c as u32) >= 0x20 && (c as u32) <= 0xFF => out.push(c as u32 as u8),
            _ => out.push(b'?'),
        }
    }
    out
}

/// Render the matrix as a landscape PDF
///
/// Lessons that do not fit across one page are split into column groups;
/// each group repeats the employee names and the summary columns.
pub fn render_pdf(matrix: &AttendanceMatrix, title: &str) -> Vec<u8> {
    let rows = export_rows(matrix);
    let lessons = matrix.lessons();

    let lesson_area = PAGE_WIDTH - 2.0 * MARGIN - NAME_COLUMN - SUMMARY_HEADERS.len() as f64 * SUMMARY_COLUMN;
    let per_group = ((lesson_area / MIN_LESSON_COLUMN).floor() as usize).max(1);
    let groups: Vec<(usize, usize)> = if lessons.is_empty() {
        vec![(0, 0)]
    } else {
        (0..lessons.len())
            .step_by(per_group)
            .map(|start| (start, (start + per_group).min(lessons.len())))
            .collect()
    };

    let first_row_y = PAGE_HEIGHT - MARGIN - 3.0 * LINE_HEIGHT;
    let rows_per_page = (((first_row_y - MARGIN) / LINE_HEIGHT).floor() as usize).max(1);
    let row_chunks: Vec<&[ExportRow]> = if rows.is_empty() {
        vec![&[]]
    } else {
        rows.chunks(rows_per_page).collect()
    };

    let mut pages = Vec::new();
    for &(from, to) in &groups {
        let count = to - from;
        let column = if count == 0 {
            MIN_LESSON_COLUMN
        } else {
            (lesson_area / count as f64).min(60.0)
        };
        let summary_x = MARGIN + NAME_COLUMN + count as f64 * column;

        for chunk in &row_chunks {
            let mut page = PageText::new();
            page.text(MARGIN, PAGE_HEIGHT - MARGIN, title);

            let header_y = PAGE_HEIGHT - MARGIN - 2.0 * LINE_HEIGHT;
            page.text(MARGIN, header_y, "Employee");
            for (i, lesson) in lessons[from..to].iter().enumerate() {
                page.text(
                    MARGIN + NAME_COLUMN + i as f64 * column,
                    header_y,
                    lesson.date.format("%d/%m").to_string(),
                );
            }
            for (i, heading) in SUMMARY_HEADERS.iter().enumerate() {
                let short = match *heading {
                    "Total hours" => "Hours",
                    "Attended hours" => "Attended",
                    "Percentage" => "%",
                    other => other,
                };
                page.text(summary_x + i as f64 * SUMMARY_COLUMN, header_y, short);
            }

            for (r, row) in chunk.iter().enumerate() {
                let y = first_row_y - r as f64 * LINE_HEIGHT;
                let s = &row.stats;
                page.text(MARGIN, y, truncate(&s.name, 32));
                for (i, cell) in row.cells[from..to].iter().enumerate() {
                    page.text(MARGIN + NAME_COLUMN + i as f64 * column, y, *cell);
                }
                let summary = [
                    s.present.to_string(),
                    s.absent.to_string(),
                    s.justified.to_string(),
                    format_percentage(s.percentage),
                    format_hours(s.total_hours),
                    format_hours(s.attended_hours),
                ];
                for (i, value) in summary.into_iter().enumerate() {
                    page.text(summary_x + i as f64 * SUMMARY_COLUMN, y, value);
                }
            }
            pages.push(page);
        }
    }

    write_pdf(&pages)
}

fn truncate(value: &str, max: usize) -> String {
    if value.chars().count() <= max {
        value.to_string()
    } else {
        let mut s: String = value.chars().take(max - 1).collect();
        s.push('.');
        s
    }
}

/// Serialise pages into a PDF 1.4 document with an uncompressed Helvetica text layer
fn write_pdf(pages: &[PageText]) -> Vec<u8> {
    // Object ids: 1 catalog, 2 page tree, 3 font, then (page, content) pairs
    let page_ids: Vec<usize> = (0..pages.len()).map(|i| 4 + 2 * i).collect();
    let mut objects: Vec<Vec<u8>> = Vec::new();

    objects.push(b"<< /Type /Catalog /Pages 2 0 R >>".to_vec());
    let kids = page_ids
        .iter()
        .map(|id| format!("{} 0 R", id))
        .collect::<Vec<_>>()
        .join(" ");
    objects.push(format!("<< /Type /Pages /Kids [{}] /Count {} >>", kids, pages.len()).into_bytes());
    objects.push(
        b"<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>"
            .to_vec(),
    );

    for (page, id) in pages.iter().zip(&page_ids) {
        objects.push(
            format!(
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {} {}] /Resources << /Font << /F1 3 0 R >> >> /Contents {} 0 R >>",
                PAGE_WIDTH, PAGE_HEIGHT, id + 1
            )
            .into_bytes(),
        );
        let content = page.content_stream();
        let mut stream = format!("<< /Length {} >>\nstream\n", content.len()).into_bytes();
        stream.extend(content);
        stream.extend_from_slice(b"\nendstream");
        objects.push(stream);
    }

    let mut out = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n", i + 1).as_bytes());
        out.extend_from_slice(body);
        out.extend_from_slice(b"\nendobj\n");
    }

    let xref_offset = out.len();
    let mut xref = String::new();
    let _ = write!(xref, "xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1);
    for offset in offsets {
        let _ = write!(xref, "{:010} 00000 n \n", offset);
    }
    let _ = write!(
        xref,
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
        objects.len() + 1,
        xref_offset
    );
    out.extend_from_slice(xref.as_bytes());
    out
}
