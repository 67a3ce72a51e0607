// 🌐 Report texts in German and English, plus number formatting

use crate::aggregation::Period;
use crate::settings::{Language, QuarterMode};

#[derive(Debug)]
pub struct Labels {
    pub report_title: &'static str,
    pub fiscal_year: &'static str,
    pub generated_on: &'static str,
    pub opening_balance: &'static str,
    pub period_result: &'static str,
    pub closing_balance: &'static str,
    pub quarter: &'static str,
    pub cumulative_until: &'static str,
    pub annual_overview: &'static str,
    pub super_group: &'static str,
    pub bwa_group: &'static str,
    pub account: &'static str,
    pub amount: &'static str,
    pub total: &'static str,
    pub subtotal: &'static str,
    pub charts: &'static str,
    pub chart_by_group: &'static str,
    pub chart_by_account: &'static str,
    pub truncated_note: &'static str,
    pub account_details: &'static str,
    pub date: &'static str,
    pub booking_number: &'static str,
    pub purpose: &'static str,
    pub transactions: &'static str,
    pub continued: &'static str,
    pub page: &'static str,
    pub quarter_mode_individual: &'static str,
    pub quarter_mode_cumulative: &'static str,
    pub no_data: &'static str,
    // Terminal UI
    pub name: &'static str,
    pub year: &'static str,
    pub view_mappings: &'static str,
    pub account_mappings: &'static str,
    pub unassigned: &'static str,
    pub mode: &'static str,
    pub view: &'static str,
    pub details: &'static str,
    pub booking_details: &'static str,
    pub no_selection: &'static str,
    pub raw_value: &'static str,
    pub line: &'static str,
    pub quit: &'static str,
}

pub static GERMAN: Labels = Labels {
    report_title: "Betriebswirtschaftliche Auswertung",
    fiscal_year: "Geschäftsjahr",
    generated_on: "Erstellt am",
    opening_balance: "Anfangsbestand",
    period_result: "Ergebnis",
    closing_balance: "Endbestand",
    quarter: "Quartal",
    cumulative_until: "kumuliert bis",
    annual_overview: "Jahresübersicht",
    super_group: "Obergruppe",
    bwa_group: "BWA-Gruppe",
    account: "Sachkonto",
    amount: "Betrag",
    total: "Gesamt",
    subtotal: "Summe",
    charts: "Grafische Auswertung",
    chart_by_group: "Ergebnis nach BWA-Gruppen",
    chart_by_account: "Ergebnis nach Sachkonten",
    truncated_note: "Balken gekürzt, tatsächlicher Wert",
    account_details: "Kontenblatt",
    date: "Datum",
    booking_number: "Buchungsnr.",
    purpose: "Verwendungszweck",
    transactions: "Buchungen",
    continued: "Fortsetzung",
    page: "Seite",
    quarter_mode_individual: "quartalsweise",
    quarter_mode_cumulative: "kumuliert",
    no_data: "Keine Buchungen",
    name: "Name",
    year: "Jahr",
    view_mappings: "Zuordnung",
    account_mappings: "Kontenzuordnung",
    unassigned: "nicht zugeordnet",
    mode: "Modus",
    view: "Ansicht",
    details: "Details",
    booking_details: "Buchungsdetails",
    no_selection: "Keine Buchung ausgewählt",
    raw_value: "Rohwert",
    line: "Zeile",
    quit: "Beenden",
};

pub static ENGLISH: Labels = Labels {
    report_title: "Business Analysis Report",
    fiscal_year: "Fiscal year",
    generated_on: "Generated on",
    opening_balance: "Opening balance",
    period_result: "Result",
    closing_balance: "Closing balance",
    quarter: "Quarter",
    cumulative_until: "cumulative through",
    annual_overview: "Annual overview",
    super_group: "Super-group",
    bwa_group: "BWA group",
    account: "Account",
    amount: "Amount",
    total: "Total",
    subtotal: "Subtotal",
    charts: "Charts",
    chart_by_group: "Result by BWA group",
    chart_by_account: "Result by account",
    truncated_note: "bar truncated, actual value",
    account_details: "Account sheet",
    date: "Date",
    booking_number: "Booking no.",
    purpose: "Purpose",
    transactions: "Transactions",
    continued: "continued",
    page: "Page",
    quarter_mode_individual: "per quarter",
    quarter_mode_cumulative: "cumulative",
    no_data: "No transactions",
    name: "Name",
    year: "Year",
    view_mappings: "Mappings",
    account_mappings: "Account mappings",
    unassigned: "unassigned",
    mode: "Mode",
    view: "View",
    details: "Details",
    booking_details: "Transaction details",
    no_selection: "No transaction selected",
    raw_value: "Raw value",
    line: "Line",
    quit: "Quit",
};

impl Labels {
    pub fn for_language(language: Language) -> &'static Labels {
        match language {
            Language::German => &GERMAN,
            Language::English => &ENGLISH,
        }
    }

    /// "Quartal 2 / 2024", "Quartal 1-2 (kumuliert bis Q2) / 2024", "Jahresübersicht 2024"
    pub fn period_title(&self, period: Period, year: i32) -> String {
        match period {
            Period::Quarter(q) => format!("{} {} / {}", self.quarter, q, year),
            Period::CumulativeQuarter(1) => format!("{} 1 / {}", self.quarter, year),
            Period::CumulativeQuarter(q) => format!(
                "{} 1-{} ({} Q{}) / {}",
                self.quarter, q, self.cumulative_until, q, year
            ),
            Period::Year => format!("{} {}", self.annual_overview, year),
        }
    }

    pub fn quarter_mode(&self, mode: QuarterMode) -> &'static str {
        match mode {
            QuarterMode::Individual => self.quarter_mode_individual,
            QuarterMode::Cumulative => self.quarter_mode_cumulative,
        }
    }
}

/// Two decimals with thousands grouping: `1.234,56` (de) / `1,234.56` (en)
pub fn format_amount(value: f64, language: Language) -> String {
    let (thousands, decimal) = match language {
        Language::German => ('.', ','),
        Language::English => (',', '.'),
    };

    let rounded = (value * 100.0).round() / 100.0;
    // Avoid "-0,00"
    let rounded = if rounded == 0.0 { 0.0 } else { rounded };
    let text = format!("{:.2}", rounded.abs());
    let (int_part, frac_part) = text.split_once('.').unwrap_or((text.as_str(), "00"));

    let mut grouped = String::new();
    for (i, c) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(thousands);
        }
        grouped.push(c);
    }

    format!(
        "{}{}{}{}",
        if rounded < 0.0 { "-" } else { "" },
        grouped,
        decimal,
        frac_part
    )
}

/// Amount with currency sign, e.g. `1.234,56 €`
pub fn format_currency(value: f64, language: Language) -> String {
    format!("{} €", format_amount(value, language))
}
