// 📄 BWA PDF - cover, quarter pages, annual page, charts, account sheets
//
// `PdfCanvas` wraps printpdf with a top-down cursor (millimetres from the
// top margin) and automatic page breaks. `BwaPdfGenerator` lays out the
// sections in fixed order on top of it.

use crate::aggregation::{BalanceInfo, PeriodSummary};
use crate::chart::{layout_bars, zigzag_points, Bar, BarChartLayout};
use crate::labels::{format_amount, format_currency, Labels};
use crate::report::ReportData;
use crate::settings::{Language, Settings};
use anyhow::{anyhow, Context, Result};
use printpdf::image_crate::codecs::jpeg::JpegDecoder;
use printpdf::image_crate::codecs::png::PngDecoder;
use printpdf::image_crate::ImageDecoder;
use printpdf::path::{PaintMode, WindingOrder};
use printpdf::{
    BuiltinFont, Color, Image, ImageTransform, IndirectFontRef, Line, Mm, PdfDocument,
    PdfDocumentReference, PdfLayerReference, Point, Polygon, Rgb,
};
use std::fs::File;
use std::io::BufWriter;
use std::ops::Range;
use std::path::Path;

// A4 portrait, all values in mm
const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN: f32 = 20.0;
const CONTENT_WIDTH: f32 = PAGE_WIDTH - 2.0 * MARGIN;
const FOOTER_Y: f32 = 10.0;

const ROW_HEIGHT: f32 = 6.0;
const PT_TO_MM: f32 = 0.3528;

type Rgb3 = (f32, f32, f32);

const BLACK: Rgb3 = (0.0, 0.0, 0.0);
const WHITE: Rgb3 = (1.0, 1.0, 1.0);
const GREY: Rgb3 = (0.45, 0.45, 0.45);
const LIGHT_GREY: Rgb3 = (0.92, 0.92, 0.92);
const GREEN: Rgb3 = (0.20, 0.60, 0.30);
const RED: Rgb3 = (0.80, 0.20, 0.20);

// ============================================================================
// CANVAS
// ============================================================================

pub struct PdfCanvas {
    doc: PdfDocumentReference,
    layer: PdfLayerReference,
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    /// Distance from the top edge of the page
    cursor: f32,
    pages: usize,
    footer: String,
}

impl PdfCanvas {
    pub fn new(title: &str, footer: &str) -> Result<Self> {
        let (doc, page, layer) =
            PdfDocument::new(title, Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
        let regular = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|e| anyhow!("Failed to load PDF font: {:?}", e))?;
        let bold = doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(|e| anyhow!("Failed to load PDF font: {:?}", e))?;
        let layer = doc.get_page(page).get_layer(layer);

        let canvas = PdfCanvas {
            doc,
            layer,
            regular,
            bold,
            cursor: MARGIN,
            pages: 1,
            footer: footer.to_string(),
        };
        canvas.draw_footer();
        Ok(canvas)
    }

    pub fn page_count(&self) -> usize {
        self.pages
    }

    pub fn cursor(&self) -> f32 {
        self.cursor
    }

    pub fn new_page(&mut self) {
        let (page, layer) = self
            .doc
            .add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
        self.layer = self.doc.get_page(page).get_layer(layer);
        self.cursor = MARGIN;
        self.pages += 1;
        self.draw_footer();
    }

    /// Break the page when less than `height` remains; true on a break
    pub fn ensure_space(&mut self, height: f32) -> bool {
        if !fits(self.cursor, height) {
            self.new_page();
            true
        } else {
            false
        }
    }

    pub fn advance(&mut self, height: f32) {
        self.cursor += height;
    }

    fn draw_footer(&self) {
        let text = format!("{}  |  {}", self.footer, self.pages);
        self.text_at(&text, 8.0, MARGIN, PAGE_HEIGHT - FOOTER_Y, false, GREY);
    }

    /// Text with its baseline `top` mm below the page top
    pub fn text_at(&self, text: &str, size: f32, x: f32, top: f32, bold: bool, color: Rgb3) {
        let font = if bold { &self.bold } else { &self.regular };
        self.layer.set_fill_color(rgb(color));
        self.layer
            .use_text(text, size, Mm(x), Mm(PAGE_HEIGHT - top), font);
    }

    /// Text on the current cursor line
    pub fn text(&self, text: &str, size: f32, x: f32, bold: bool) {
        self.text_at(text, size, x, self.cursor, bold, BLACK);
    }

    /// Right-aligned text ending at `right`; width is estimated from
    /// Helvetica's average glyph width
    pub fn text_right(&self, text: &str, size: f32, right: f32, bold: bool) {
        let x = right - estimate_width(text, size);
        self.text_at(text, size, x, self.cursor, bold, BLACK);
    }

    /// Filled rectangle, `top` measured from the page top
    pub fn fill_rect(&self, x: f32, top: f32, width: f32, height: f32, color: Rgb3) {
        let (x0, x1) = if width < 0.0 { (x + width, x) } else { (x, x + width) };
        let y0 = PAGE_HEIGHT - top - height;
        let y1 = PAGE_HEIGHT - top;
        let ring = vec![
            (Point::new(Mm(x0), Mm(y0)), false),
            (Point::new(Mm(x1), Mm(y0)), false),
            (Point::new(Mm(x1), Mm(y1)), false),
            (Point::new(Mm(x0), Mm(y1)), false),
        ];

        self.layer.set_fill_color(rgb(color));
        self.layer.add_polygon(Polygon {
            rings: vec![ring],
            mode: PaintMode::Fill,
            winding_order: WindingOrder::NonZero,
        });
    }

    /// Open polyline through points given as (x, top)
    pub fn polyline(&self, points: &[(f32, f32)], color: Rgb3, thickness: f32) {
        let points = points
            .iter()
            .map(|(x, top)| (Point::new(Mm(*x), Mm(PAGE_HEIGHT - top)), false))
            .collect();

        self.layer.set_outline_color(rgb(color));
        self.layer.set_outline_thickness(thickness);
        self.layer.add_line(Line {
            points,
            is_closed: false,
        });
    }

    pub fn hline(&self, x0: f32, x1: f32, top: f32, color: Rgb3) {
        self.polyline(&[(x0, top), (x1, top)], color, 0.5);
    }

    /// Place a PNG/JPEG image with its top-left corner at (x, top), scaled
    /// to `max_height`
    pub fn image(&self, path: &Path, x: f32, top: f32, max_height: f32) -> Result<f32> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();
        let file = File::open(path)
            .with_context(|| format!("Failed to open logo: {}", path.display()))?;
        let reader = std::io::BufReader::new(file);

        let (image, (width_px, height_px)) = match extension.as_str() {
            "png" => {
                let decoder = PngDecoder::new(reader)
                    .map_err(|e| anyhow!("Invalid PNG logo {}: {}", path.display(), e))?;
                let dimensions = decoder.dimensions();
                let image = Image::try_from(decoder)
                    .map_err(|e| anyhow!("Invalid PNG logo {}: {}", path.display(), e))?;
                (image, dimensions)
            }
            "jpg" | "jpeg" => {
                let decoder = JpegDecoder::new(reader)
                    .map_err(|e| anyhow!("Invalid JPEG logo {}: {}", path.display(), e))?;
                let dimensions = decoder.dimensions();
                let image = Image::try_from(decoder)
                    .map_err(|e| anyhow!("Invalid JPEG logo {}: {}", path.display(), e))?;
                (image, dimensions)
            }
            other => return Err(anyhow!("Unsupported logo format '{}'", other)),
        };

        if height_px == 0 || width_px == 0 {
            return Err(anyhow!("Logo has no pixels: {}", path.display()));
        }

        // 1 inch = 25.4 mm; choose the dpi that yields `max_height`
        let dpi = height_px as f32 * 25.4 / max_height;
        let width_mm = width_px as f32 * 25.4 / dpi;

        image.add_to_layer(
            self.layer.clone(),
            ImageTransform {
                translate_x: Some(Mm(x - width_mm)),
                translate_y: Some(Mm(PAGE_HEIGHT - top - max_height)),
                dpi: Some(dpi),
                ..Default::default()
            },
        );
        Ok(width_mm)
    }

    pub fn save(self, path: &Path) -> Result<()> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create PDF: {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        self.doc
            .save(&mut writer)
            .map_err(|e| anyhow!("Failed to write PDF {}: {:?}", path.display(), e))?;
        Ok(())
    }
}

fn rgb((r, g, b): Rgb3) -> Color {
    Color::Rgb(Rgb::new(r, g, b, None))
}

/// Approximate rendered width in mm of `text` at `size` pt
pub fn estimate_width(text: &str, size: f32) -> f32 {
    text.chars().count() as f32 * size * 0.52 * PT_TO_MM
}

/// Cut `text` to `max_chars`, marking the cut with "..."
fn clip(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let kept: String = text.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

// ============================================================================
// GENERATOR
// ============================================================================

pub struct BwaPdfGenerator<'a> {
    data: &'a ReportData,
    settings: &'a Settings,
    labels: &'static Labels,
    header_color: Rgb3,
    canvas: PdfCanvas,
}

impl<'a> BwaPdfGenerator<'a> {
    pub fn new(data: &'a ReportData, settings: &'a Settings) -> Result<Self> {
        let labels = Labels::for_language(settings.language);
        let footer = if data.organization.name.is_empty() {
            format!("{} {}", labels.report_title, data.year)
        } else {
            format!("{}  |  {} {}", data.organization.name, labels.report_title, data.year)
        };
        let title = format!("{} {}", labels.report_title, data.year);

        Ok(BwaPdfGenerator {
            data,
            settings,
            labels,
            header_color: settings.header_rgb(),
            canvas: PdfCanvas::new(&title, &footer)?,
        })
    }

    fn language(&self) -> Language {
        self.settings.language
    }

    /// Render every enabled section and write the file; returns the page count
    pub fn render(mut self, output: &Path) -> Result<usize> {
        let data = self.data;
        let sections = self.settings.sections;
        self.cover_page();

        if sections.include_quarterly {
            for (summary, balance) in &data.quarterly {
                self.canvas.new_page();
                self.summary_page(summary, Some(balance));
            }
        }

        self.canvas.new_page();
        self.summary_page(&data.yearly, Some(&data.balance));

        if sections.include_charts && !data.yearly.is_empty() {
            self.canvas.new_page();
            self.chart_page();
        }

        if sections.include_account_details {
            for index in 0..data.accounts.len() {
                self.canvas.new_page();
                self.account_page(index);
            }
        }

        let pages = self.canvas.page_count();
        self.canvas.save(output)?;
        Ok(pages)
    }

    // ------------------------------------------------------------------------
    // Cover
    // ------------------------------------------------------------------------

    fn cover_page(&mut self) {
        let data = self.data;
        let labels = self.labels;
        let lang = self.language();

        if let Some(logo) = &self.settings.logo_path {
            if let Err(err) = self.canvas.image(logo, PAGE_WIDTH - MARGIN, MARGIN, 25.0) {
                tracing::warn!(logo = %logo.display(), %err, "logo skipped");
            }
        }

        self.canvas.advance(40.0);
        self.canvas.text(labels.report_title, 22.0, MARGIN, true);
        self.canvas.advance(12.0);
        self.canvas
            .text(&format!("{} {}", labels.fiscal_year, data.year), 16.0, MARGIN, false);
        self.canvas.advance(20.0);

        for line in data.organization.address_lines() {
            self.canvas.text(&line, 11.0, MARGIN, false);
            self.canvas.advance(ROW_HEIGHT);
        }

        self.canvas.advance(ROW_HEIGHT * 2.0);
        let right = MARGIN + 120.0;
        let rows = [
            (labels.opening_balance, data.balance.opening_balance, false),
            (labels.period_result, data.balance.total_transactions, false),
            (labels.closing_balance, data.balance.closing_balance, true),
        ];
        for (label, value, bold) in rows {
            self.canvas.text(label, 11.0, MARGIN, bold);
            self.canvas
                .text_right(&format_currency(value, lang), 11.0, right, bold);
            self.canvas.advance(ROW_HEIGHT + 1.0);
        }

        self.canvas.advance(ROW_HEIGHT * 2.0);
        let generated = data.generated_at.format("%d.%m.%Y %H:%M").to_string();
        let mode = labels.quarter_mode(data.quarter_mode);
        let top = self.canvas.cursor();
        self.canvas.text_at(
            &format!("{} {}  |  {}", labels.generated_on, generated, mode),
            9.0,
            MARGIN,
            top,
            false,
            GREY,
        );
    }

    // ------------------------------------------------------------------------
    // Summary tables
    // ------------------------------------------------------------------------

    fn summary_page(&mut self, summary: &PeriodSummary, balance: Option<&BalanceInfo>) {
        let labels = self.labels;
        let lang = self.language();
        let amount_right = PAGE_WIDTH - MARGIN - 2.0;

        self.page_title(&labels.period_title(summary.period, self.data.year));

        if summary.is_empty() {
            self.canvas.text(labels.no_data, 11.0, MARGIN, false);
            self.canvas.advance(ROW_HEIGHT);
        } else {
            self.summary_header();

            for (super_group, groups) in summary.ordered_super_groups() {
                if self.canvas.ensure_space(ROW_HEIGHT * 2.0) {
                    self.summary_header();
                }
                self.canvas.text(super_group, 10.0, MARGIN + 2.0, true);
                self.canvas.advance(ROW_HEIGHT);

                for (group, sum) in groups {
                    if self.canvas.ensure_space(ROW_HEIGHT) {
                        self.summary_header();
                    }
                    self.canvas.text(&clip(group, 60), 10.0, MARGIN + 8.0, false);
                    self.canvas
                        .text_right(&format_amount(*sum, lang), 10.0, amount_right, false);
                    self.canvas.advance(ROW_HEIGHT);
                }

                let subtotal: f64 = groups.values().sum();
                let top = self.canvas.cursor() - ROW_HEIGHT + 1.5;
                self.canvas.hline(PAGE_WIDTH - MARGIN - 45.0, PAGE_WIDTH - MARGIN, top, GREY);
                self.canvas.text(
                    &format!("{} {}", labels.subtotal, super_group),
                    10.0,
                    MARGIN + 2.0,
                    true,
                );
                self.canvas
                    .text_right(&format_amount(subtotal, lang), 10.0, amount_right, true);
                self.canvas.advance(ROW_HEIGHT * 1.5);
            }

            self.canvas.ensure_space(ROW_HEIGHT * 2.0);
            let top = self.canvas.cursor() - ROW_HEIGHT + 1.0;
            self.canvas
                .fill_rect(MARGIN, top, CONTENT_WIDTH, ROW_HEIGHT + 1.0, LIGHT_GREY);
            self.canvas.advance(0.5);
            self.canvas.text(labels.total, 11.0, MARGIN + 2.0, true);
            self.canvas
                .text_right(&format_amount(summary.total, lang), 11.0, amount_right, true);
            self.canvas.advance(ROW_HEIGHT * 2.0);
        }

        if let Some(balance) = balance {
            self.balance_block(balance);
        }
    }

    fn summary_header(&mut self) {
        let labels = self.labels;
        let header = [
            (labels.super_group, MARGIN + 2.0, false),
            (labels.bwa_group, MARGIN + 50.0, false),
            (labels.amount, PAGE_WIDTH - MARGIN - 2.0, true),
        ];
        self.table_header(&header);
    }

    fn balance_block(&mut self, balance: &BalanceInfo) {
        let labels = self.labels;
        let lang = self.language();
        let right = MARGIN + 120.0;

        self.canvas.ensure_space(ROW_HEIGHT * 4.0);
        let rows = [
            (labels.opening_balance, balance.opening_balance, false),
            (labels.period_result, balance.total_transactions, false),
            (labels.closing_balance, balance.closing_balance, true),
        ];
        for (label, value, bold) in rows {
            self.canvas.text(label, 10.0, MARGIN + 2.0, bold);
            self.canvas
                .text_right(&format_currency(value, lang), 10.0, right, bold);
            self.canvas.advance(ROW_HEIGHT);
        }
    }

    fn page_title(&mut self, title: &str) {
        self.canvas.advance(6.0);
        self.canvas.text(title, 16.0, MARGIN, true);
        self.canvas.advance(4.0);
        let top = self.canvas.cursor();
        self.canvas.hline(MARGIN, PAGE_WIDTH - MARGIN, top, self.header_color);
        self.canvas.advance(ROW_HEIGHT + 2.0);
    }

    /// Coloured header bar; columns are (text, x, right-aligned)
    fn table_header(&mut self, columns: &[(&str, f32, bool)]) {
        let top = self.canvas.cursor() - ROW_HEIGHT + 1.5;
        self.canvas
            .fill_rect(MARGIN, top, CONTENT_WIDTH, ROW_HEIGHT + 0.5, self.header_color);
        for (text, x, right) in columns {
            let x = if *right { *x - estimate_width(text, 10.0) } else { *x };
            self.canvas
                .text_at(text, 10.0, x, self.canvas.cursor(), true, WHITE);
        }
        self.canvas.advance(ROW_HEIGHT + 1.0);
    }

    // ------------------------------------------------------------------------
    // Charts
    // ------------------------------------------------------------------------

    fn chart_page(&mut self) {
        let labels = self.labels;
        self.page_title(labels.charts);

        let groups: Vec<(String, f64)> = self
            .data
            .yearly
            .bwa_groups
            .iter()
            .map(|(g, v)| (g.clone(), *v))
            .collect();
        let layout = layout_bars(&groups, f64::from(CHART_HALF_WIDTH), false);
        self.bar_chart(labels.chart_by_group, &layout);

        let accounts: Vec<(String, f64)> = self
            .data
            .accounts
            .iter()
            .map(|a| {
                let label = if a.account_name.is_empty() {
                    a.account_number.clone()
                } else {
                    format!("{} {}", a.account_number, a.account_name)
                };
                (label, a.total)
            })
            .collect();
        let layout = layout_bars(&accounts, f64::from(CHART_HALF_WIDTH), true);
        self.canvas.advance(ROW_HEIGHT);
        self.bar_chart(labels.chart_by_account, &layout);
    }

    fn bar_chart(&mut self, title: &str, layout: &BarChartLayout) {
        let lang = self.language();
        let zero_x = MARGIN + CHART_LABEL_WIDTH + CHART_HALF_WIDTH;
        let bar_height = ROW_HEIGHT - 2.0;

        self.canvas.ensure_space(ROW_HEIGHT * 3.0);
        self.canvas.text(title, 12.0, MARGIN, true);
        self.canvas.advance(ROW_HEIGHT + 2.0);

        // One zero baseline per page the bars spill onto
        let segments = bar_segments(self.canvas.cursor(), layout.bars.len());
        for (index, segment) in segments.into_iter().enumerate() {
            if index > 0 {
                self.canvas.new_page();
            }
            let segment_top = self.canvas.cursor() - ROW_HEIGHT + 1.0;
            for bar in &layout.bars[segment] {
                self.chart_bar(bar, zero_x, bar_height, lang);
            }
            let segment_bottom = self.canvas.cursor() - ROW_HEIGHT + 1.0;
            self.canvas
                .polyline(&[(zero_x, segment_top), (zero_x, segment_bottom)], BLACK, 0.6);
        }

        let truncated = layout.truncated();
        if !truncated.is_empty() {
            self.canvas.advance(2.0);
            for bar in truncated {
                self.canvas.ensure_space(ROW_HEIGHT);
                let note = format!(
                    "* {}: {} {}",
                    clip(&bar.label, 40),
                    self.labels.truncated_note,
                    format_currency(bar.value, lang)
                );
                let top = self.canvas.cursor();
                self.canvas.text_at(&note, 8.0, MARGIN, top, false, GREY);
                self.canvas.advance(ROW_HEIGHT - 1.5);
            }
        }
    }

    fn chart_bar(&mut self, bar: &Bar, zero_x: f32, bar_height: f32, lang: Language) {
        let cursor = self.canvas.cursor();
        let bar_top = cursor - bar_height + 0.5;

        let label = if bar.truncated {
            format!("{} *", clip(&bar.label, 30))
        } else {
            clip(&bar.label, 32)
        };
        self.canvas.text(&label, 8.0, MARGIN, false);

        let color = if bar.is_positive() { GREEN } else { RED };
        let length = bar.length as f32;
        self.canvas.fill_rect(zero_x, bar_top, length, bar_height, color);

        if bar.truncated {
            let marker_x = zero_x + length * 0.85;
            let points: Vec<(f32, f32)> =
                zigzag_points(f64::from(marker_x), f64::from(bar_top), f64::from(bar_height), 2)
                    .into_iter()
                    .map(|(x, y)| (x as f32, y as f32))
                    .collect();
            self.canvas.polyline(&points, WHITE, 0.8);
        }

        let value_text = format_amount(bar.value, lang);
        if length >= 0.0 {
            self.canvas
                .text_at(&value_text, 7.0, zero_x + length + 1.0, cursor, false, GREY);
        } else {
            let x = zero_x + length - 1.0 - estimate_width(&value_text, 7.0);
            self.canvas.text_at(&value_text, 7.0, x, cursor, false, GREY);
        }
        self.canvas.advance(ROW_HEIGHT);
    }

    // ------------------------------------------------------------------------
    // Account sheets
    // ------------------------------------------------------------------------

    fn account_page(&mut self, index: usize) {
        let data = self.data;
        let labels = self.labels;
        let lang = self.language();
        let account = &data.accounts[index];
        let amount_right = PAGE_WIDTH - MARGIN - 2.0;

        let title = if account.account_name.is_empty() {
            format!("{} {}", labels.account_details, account.account_number)
        } else {
            format!(
                "{} {} - {}",
                labels.account_details, account.account_number, account.account_name
            )
        };
        self.page_title(&clip(&title, 60));

        let super_group = data.mappings.super_groups.super_group_for(&account.group);
        self.canvas.text(
            &format!("{}: {}  |  {}: {}", labels.bwa_group, account.group, labels.super_group, super_group),
            10.0,
            MARGIN,
            false,
        );
        self.canvas.advance(ROW_HEIGHT * 1.5);

        self.account_header();
        let rows = data
            .rows
            .iter()
            .filter(|r| r.account_number == account.account_number);
        for row in rows {
            if self.canvas.ensure_space(ROW_HEIGHT * 2.0) {
                let top = self.canvas.cursor();
                self.canvas.text_at(
                    &format!("{} ({})", clip(&title, 60), labels.continued),
                    10.0,
                    MARGIN,
                    top,
                    true,
                    GREY,
                );
                self.canvas.advance(ROW_HEIGHT * 1.5);
                self.account_header();
            }
            self.canvas.text(
                &row.booking_date.format("%d.%m.%Y").to_string(),
                9.0,
                MARGIN + 2.0,
                false,
            );
            self.canvas.text(&clip(&row.booking_number, 12), 9.0, MARGIN + 26.0, false);
            self.canvas.text(&clip(&row.purpose, 55), 9.0, MARGIN + 52.0, false);
            self.canvas
                .text_right(&format_amount(row.amount_clean, lang), 9.0, amount_right, false);
            self.canvas.advance(ROW_HEIGHT - 0.5);
        }

        self.canvas.ensure_space(ROW_HEIGHT * 2.0);
        self.canvas.advance(1.0);
        let top = self.canvas.cursor() - ROW_HEIGHT + 1.0;
        self.canvas
            .fill_rect(MARGIN, top, CONTENT_WIDTH, ROW_HEIGHT + 1.0, LIGHT_GREY);
        self.canvas.advance(0.5);
        self.canvas.text(
            &format!("{} ({} {})", labels.total, account.transaction_count, labels.transactions),
            10.0,
            MARGIN + 2.0,
            true,
        );
        self.canvas
            .text_right(&format_amount(account.total, lang), 10.0, amount_right, true);
        self.canvas.advance(ROW_HEIGHT);
    }

    fn account_header(&mut self) {
        let labels = self.labels;
        let header = [
            (labels.date, MARGIN + 2.0, false),
            (labels.booking_number, MARGIN + 26.0, false),
            (labels.purpose, MARGIN + 52.0, false),
            (labels.amount, PAGE_WIDTH - MARGIN - 2.0, true),
        ];
        self.table_header(&header);
    }
}

const CHART_LABEL_WIDTH: f32 = 60.0;
const CHART_HALF_WIDTH: f32 = (CONTENT_WIDTH - CHART_LABEL_WIDTH) / 2.0;

fn fits(cursor: f32, height: f32) -> bool {
    cursor + height <= PAGE_HEIGHT - MARGIN
}

/// Split `bars` chart rows into page segments; the first starts at `cursor`,
/// later ones at the top margin
fn bar_segments(cursor: f32, bars: usize) -> Vec<Range<usize>> {
    let mut segments = Vec::new();
    let mut cursor = cursor;
    let mut start = 0;
    for index in 0..bars {
        if !fits(cursor, ROW_HEIGHT) && index > start {
            segments.push(start..index);
            start = index;
            cursor = MARGIN;
        }
        cursor += ROW_HEIGHT;
    }
    if bars > start {
        segments.push(start..bars);
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clip() {
        assert_eq!(clip("Miete", 10), "Miete");
        assert_eq!(clip("Mitgliedsbeiträge allgemein", 10), "Mitglie...");
    }

    #[test]
    fn test_estimate_width_grows_with_text() {
        assert!(estimate_width("1.000,00", 10.0) > estimate_width("0,00", 10.0));
        assert_eq!(estimate_width("", 10.0), 0.0);
    }

    #[test]
    fn test_canvas_page_breaks() {
        let mut canvas = PdfCanvas::new("Test", "Footer").unwrap();
        assert_eq!(canvas.page_count(), 1);

        assert!(!canvas.ensure_space(10.0));
        canvas.advance(PAGE_HEIGHT - 2.0 * MARGIN - 5.0);
        assert!(canvas.ensure_space(10.0));
        assert_eq!(canvas.page_count(), 2);
        assert_eq!(canvas.cursor(), MARGIN);
    }

    #[test]
    fn test_bar_segments_split_across_pages() {
        let per_page = ((PAGE_HEIGHT - 2.0 * MARGIN) / ROW_HEIGHT) as usize;
        let start = PAGE_HEIGHT - MARGIN - 3.0 * ROW_HEIGHT;

        let segments = bar_segments(start, per_page + 10);
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0], 0..3);
        assert_eq!(segments[1], 3..3 + per_page);
        assert_eq!(segments[2], 3 + per_page..per_page + 10);

        assert_eq!(bar_segments(MARGIN, 5), vec![0..5]);
        assert!(bar_segments(MARGIN, 0).is_empty());
        println!("✅ Chart page segments test PASSED");
    }

    #[test]
    fn test_canvas_writes_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("canvas.pdf");

        let canvas = PdfCanvas::new("Test", "Footer").unwrap();
        canvas.text("Hallo", 12.0, MARGIN, true);
        canvas.fill_rect(MARGIN, 40.0, 50.0, 5.0, GREEN);
        canvas.fill_rect(MARGIN + 60.0, 40.0, -20.0, 5.0, RED);
        canvas.hline(MARGIN, 100.0, 50.0, BLACK);
        canvas.save(&path).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn test_missing_logo_is_an_error() {
        let canvas = PdfCanvas::new("Test", "Footer").unwrap();
        assert!(canvas
            .image(Path::new("/nonexistent/logo.png"), 190.0, 20.0, 25.0)
            .is_err());
        assert!(canvas
            .image(Path::new("/nonexistent/logo.gif"), 190.0, 20.0, 25.0)
            .is_err());
    }
}
