//! Invoice renderer — lays a priced order onto a single fixed-size page.
//!
//! Rendering is position-computed (see [`layout`]): overflow is detected
//! before a single byte is produced, and a failed render never writes a
//! partial file. Currency values are formatted with two decimals and a
//! leading symbol here, at the presentation boundary, and nowhere else.

pub mod layout;

use std::path::{Path, PathBuf};

use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, dictionary};
use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::RenderError;
use crate::pipeline::types::{InvoiceTotals, LineItem};

use layout::{
    COLUMN_WIDTHS, Layout, MARGIN, MARK_HEIGHT, MARK_WIDTH, PAGE_HEIGHT, PAGE_WIDTH, ROW_HEIGHT,
};

// ── Parties ─────────────────────────────────────────────────────────

/// One party block on the invoice (three templated lines).
#[derive(Debug, Clone)]
pub struct Party {
    pub name: String,
    pub address: String,
    pub phone: String,
}

/// Issuer and payee blocks.
#[derive(Debug, Clone)]
pub struct PartyInfo {
    pub issued_to: Party,
    pub pay_to: Party,
}

impl Default for PartyInfo {
    fn default() -> Self {
        Self {
            issued_to: Party {
                name: "John Doe".into(),
                address: "123 Main Street".into(),
                phone: "+1 234 567 890".into(),
            },
            pay_to: Party {
                name: "Factura S.A. de C.V.".into(),
                address: "456 Business Road".into(),
                phone: "+1 987 654 321".into(),
            },
        }
    }
}

/// The rendered single-page document.
#[derive(Debug)]
pub struct RenderedInvoice {
    pub bytes: Vec<u8>,
    pub path: PathBuf,
}

// ── Rendering ───────────────────────────────────────────────────────

const TITLE: &str = "Orden de Servicio";
const ISSUER_LINE: &str = "Factura - facturacion automatica";
const MARK_LABEL: &str = "FACTURA";

/// Render the invoice into PDF bytes.
///
/// Fails with [`RenderError::LayoutOverflow`] when the table plus totals
/// would cross the minimum bottom margin.
pub fn render(
    rows: &[LineItem],
    totals: &InvoiceTotals,
    parties: &PartyInfo,
) -> Result<Vec<u8>, RenderError> {
    let layout = layout::compute(rows.len())?;
    let ops = build_page_ops(rows, totals, parties, &layout);
    write_pdf(ops)
}

/// Render and write to `path`. Nothing is written on any error.
pub fn render_to_file(
    path: &Path,
    rows: &[LineItem],
    totals: &InvoiceTotals,
    parties: &PartyInfo,
) -> Result<RenderedInvoice, RenderError> {
    let bytes = render(rows, totals, parties)?;
    std::fs::write(path, &bytes)?;
    tracing::debug!(path = %path.display(), size = bytes.len(), "Invoice written");
    Ok(RenderedInvoice {
        bytes,
        path: path.to_path_buf(),
    })
}

/// Format a currency value for display: two decimals, leading symbol.
pub fn format_currency(value: Decimal) -> String {
    let rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    format!("${rounded:.2}")
}

// ── Page construction ───────────────────────────────────────────────

fn build_page_ops(
    rows: &[LineItem],
    totals: &InvoiceTotals,
    parties: &PartyInfo,
    layout: &Layout,
) -> Vec<Operation> {
    let mut ops = Vec::new();

    draw_branding_mark(&mut ops);

    // Title and issuer line
    text(&mut ops, "F2", 16.0, 200.0, layout.title_y, TITLE);
    text(&mut ops, "F1", 12.0, MARGIN, layout.issuer_y, ISSUER_LINE);

    draw_party_block(&mut ops, layout.issued_to_y, "Issued To:", &parties.issued_to);
    draw_party_block(&mut ops, layout.pay_to_y, "Pay To:", &parties.pay_to);

    draw_table(&mut ops, rows, layout);
    draw_totals(&mut ops, totals, layout);

    ops
}

/// Vector branding mark: filled box, label reversed out of it.
fn draw_branding_mark(ops: &mut Vec<Operation>) {
    let x = PAGE_WIDTH - MARK_WIDTH - 20.0;
    let y = PAGE_HEIGHT - MARK_HEIGHT - 20.0;

    fill_color(ops, 0.13, 0.22, 0.40);
    rect_filled(ops, x, y, MARK_WIDTH, MARK_HEIGHT);
    fill_color(ops, 1.0, 1.0, 1.0);
    text(ops, "F2", 14.0, x + 12.0, y + 19.0, MARK_LABEL);
    fill_color(ops, 0.0, 0.0, 0.0);
}

fn draw_party_block(ops: &mut Vec<Operation>, top: f32, heading: &str, party: &Party) {
    text(ops, "F2", 12.0, MARGIN, top, heading);
    text(ops, "F1", 12.0, MARGIN, top - 20.0, &format!("Nombre: {}", party.name));
    text(ops, "F1", 12.0, MARGIN, top - 40.0, &format!("Direccion: {}", party.address));
    text(ops, "F1", 12.0, MARGIN, top - 60.0, &format!("Telefono: {}", party.phone));
}

fn draw_table(ops: &mut Vec<Operation>, rows: &[LineItem], layout: &Layout) {
    let table_width: f32 = COLUMN_WIDTHS.iter().sum();

    // Header row: filled background, reversed bold text.
    fill_color(ops, 0.5, 0.5, 0.5);
    rect_filled(ops, MARGIN, layout.table_top - ROW_HEIGHT, table_width, ROW_HEIGHT);
    fill_color(ops, 1.0, 1.0, 1.0);
    draw_row_text(
        ops,
        "F2",
        layout.table_top,
        ["Producto", "Cantidad", "Precio", "Total"],
    );

    // Data rows on a light background.
    fill_color(ops, 0.96, 0.96, 0.86);
    rect_filled(
        ops,
        MARGIN,
        layout.table_bottom,
        table_width,
        rows.len() as f32 * ROW_HEIGHT,
    );
    fill_color(ops, 0.0, 0.0, 0.0);
    for (i, row) in rows.iter().enumerate() {
        let row_top = layout.table_top - (i as f32 + 1.0) * ROW_HEIGHT;
        draw_row_text(
            ops,
            "F1",
            row_top,
            [
                row.name.as_str(),
                &row.quantity.to_string(),
                &format_currency(row.unit_price),
                &format_currency(row.line_total),
            ],
        );
    }

    draw_grid(ops, rows.len(), layout);
}

fn draw_row_text(ops: &mut Vec<Operation>, font: &str, row_top: f32, cells: [&str; 4]) {
    let baseline = row_top - 14.0;
    let mut x = MARGIN;
    for (cell, width) in cells.into_iter().zip(COLUMN_WIDTHS) {
        text(ops, font, 10.0, x + 5.0, baseline, cell);
        x += width;
    }
}

/// Table borders: outer frame, column separators, row separators.
fn draw_grid(ops: &mut Vec<Operation>, rows: usize, layout: &Layout) {
    let table_width: f32 = COLUMN_WIDTHS.iter().sum();
    stroke_color(ops, 0.0, 0.0, 0.0);
    ops.push(Operation::new("w", vec![Object::Real(1.0)]));

    rect_stroked(
        ops,
        MARGIN,
        layout.table_bottom,
        table_width,
        layout.table_top - layout.table_bottom,
    );

    let mut x = MARGIN;
    for width in &COLUMN_WIDTHS[..3] {
        x += width;
        line(ops, x, layout.table_bottom, x, layout.table_top);
    }

    for i in 1..=rows {
        let y = layout.table_top - i as f32 * ROW_HEIGHT;
        line(ops, MARGIN, y, MARGIN + table_width, y);
    }
}

fn draw_totals(ops: &mut Vec<Operation>, totals: &InvoiceTotals, layout: &Layout) {
    let rows = [
        ("Subtotal:", totals.subtotal),
        ("IVA:", totals.tax),
        ("Total:", totals.grand_total),
    ];
    for (i, (label, value)) in rows.iter().enumerate() {
        let y = layout.totals_y - i as f32 * ROW_HEIGHT;
        text(ops, "F2", 12.0, 400.0, y, label);
        text(ops, "F1", 12.0, 500.0, y, &format_currency(*value));
    }
}

// ── Operator helpers ────────────────────────────────────────────────

fn text(ops: &mut Vec<Operation>, font: &str, size: f32, x: f32, y: f32, content: &str) {
    ops.push(Operation::new("BT", vec![]));
    ops.push(Operation::new("Tf", vec![font.into(), Object::Real(size)]));
    ops.push(Operation::new("Td", vec![Object::Real(x), Object::Real(y)]));
    ops.push(Operation::new("Tj", vec![Object::string_literal(content)]));
    ops.push(Operation::new("ET", vec![]));
}

fn fill_color(ops: &mut Vec<Operation>, r: f32, g: f32, b: f32) {
    ops.push(Operation::new(
        "rg",
        vec![Object::Real(r), Object::Real(g), Object::Real(b)],
    ));
}

fn stroke_color(ops: &mut Vec<Operation>, r: f32, g: f32, b: f32) {
    ops.push(Operation::new(
        "RG",
        vec![Object::Real(r), Object::Real(g), Object::Real(b)],
    ));
}

fn rect_filled(ops: &mut Vec<Operation>, x: f32, y: f32, w: f32, h: f32) {
    ops.push(Operation::new(
        "re",
        vec![Object::Real(x), Object::Real(y), Object::Real(w), Object::Real(h)],
    ));
    ops.push(Operation::new("f", vec![]));
}

fn rect_stroked(ops: &mut Vec<Operation>, x: f32, y: f32, w: f32, h: f32) {
    ops.push(Operation::new(
        "re",
        vec![Object::Real(x), Object::Real(y), Object::Real(w), Object::Real(h)],
    ));
    ops.push(Operation::new("S", vec![]));
}

fn line(ops: &mut Vec<Operation>, x1: f32, y1: f32, x2: f32, y2: f32) {
    ops.push(Operation::new("m", vec![Object::Real(x1), Object::Real(y1)]));
    ops.push(Operation::new("l", vec![Object::Real(x2), Object::Real(y2)]));
    ops.push(Operation::new("S", vec![]));
}

// ── Document assembly ───────────────────────────────────────────────

fn write_pdf(ops: Vec<Operation>) -> Result<Vec<u8>, RenderError> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let regular_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let bold_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica-Bold",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => regular_id,
            "F2" => bold_id,
        },
    });

    let content = Content { operations: ops };
    let encoded = content
        .encode()
        .map_err(|e| RenderError::Pdf(e.to_string()))?;
    let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));

    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
    });

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
            "Resources" => resources_id,
            "MediaBox" => vec![
                0.into(),
                0.into(),
                Object::Real(PAGE_WIDTH),
                Object::Real(PAGE_HEIGHT),
            ],
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)
        .map_err(|e| RenderError::Pdf(e.to_string()))?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_rows(count: usize) -> Vec<LineItem> {
        (0..count)
            .map(|i| LineItem {
                name: format!("PRODUCTO {i}"),
                quantity: 1,
                unit_price: dec!(10.00),
                line_total: dec!(10.00),
            })
            .collect()
    }

    fn sample_totals() -> InvoiceTotals {
        InvoiceTotals {
            subtotal: dec!(5200.00),
            tax_rate: dec!(0.16),
            tax: dec!(832.00),
            grand_total: dec!(6032.00),
        }
    }

    #[test]
    fn five_rows_render_as_pdf() {
        let bytes = render(&sample_rows(5), &sample_totals(), &PartyInfo::default()).unwrap();
        assert!(bytes.starts_with(b"%PDF-"));
        assert!(bytes.len() > 500);
    }

    #[test]
    fn hundred_rows_fail_with_overflow() {
        let err = render(&sample_rows(100), &sample_totals(), &PartyInfo::default()).unwrap_err();
        assert!(matches!(err, RenderError::LayoutOverflow { rows: 100, .. }));
    }

    #[test]
    fn overflow_writes_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("invoice.pdf");
        let result = render_to_file(
            &path,
            &sample_rows(100),
            &sample_totals(),
            &PartyInfo::default(),
        );
        assert!(result.is_err());
        assert!(!path.exists());
    }

    #[test]
    fn render_to_file_writes_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("invoice.pdf");
        let rendered = render_to_file(
            &path,
            &sample_rows(3),
            &sample_totals(),
            &PartyInfo::default(),
        )
        .unwrap();
        assert_eq!(rendered.path, path);
        assert_eq!(std::fs::read(&path).unwrap(), rendered.bytes);
    }

    #[test]
    fn empty_order_still_renders() {
        let bytes = render(&[], &sample_totals(), &PartyInfo::default()).unwrap();
        assert!(bytes.starts_with(b"%PDF-"));
    }

    #[test]
    fn currency_formatting_two_decimals_leading_symbol() {
        assert_eq!(format_currency(dec!(4000)), "$4000.00");
        assert_eq!(format_currency(dec!(832.0000)), "$832.00");
        assert_eq!(format_currency(dec!(0.005)), "$0.01");
        assert_eq!(format_currency(dec!(1250.5)), "$1250.50");
    }
}
