//! Document models handed to the PDF renderer.
//!
//! Everything is pre-resolved: labels, formatted dates, and monetary
//! amounts rounded to two decimals. The renderer only lays the fields out.

use super::pricing::PriceBook;
use super::valuation::{value_lines, LineValue, Valuation};
use crate::models::{
    Client, Contract, ProformaDetails, Project, WorkReportItem, WorkReportWithItems,
};
use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use uuid::Uuid;

pub const WORK_REPORT_TITLE: &str = "PROCES VERBAL";
pub const PROFORMA_TITLE: &str = "FACTURĂ PROFORMĂ";
pub const CONTRACT_TITLE: &str = "CONTRACT DE ÎNCHIRIERE SCHELE";

const CONTRACT_SUBJECT: &str = "Închirierea de echipamente de schele pentru lucrări de construcție.";
const INDEFINITE_PERIOD: &str = "Nedeterminată";

/// Terms printed on a contract that does not carry its own.
pub const DEFAULT_CONTRACT_TERMS: [&str; 5] = [
    "Proprietarul pune la dispoziția beneficiarului echipamente de schele conform specificațiilor tehnice.",
    "Beneficiarul se obligă să utilizeze echipamentele conform instrucțiunilor și să le restituie în starea în care le-a primit.",
    "Beneficiarul este responsabil pentru întreținerea și securitatea echipamentelor pe durata contractului.",
    "Orice deteriorare sau pierdere a echipamentelor va fi suportată de beneficiar.",
    "Contractul poate fi reziliat de oricare dintre părți cu notificare prealabilă de 7 zile.",
];

const DATE_FORMAT: &str = "%d.%m.%Y";
const PLACEHOLDER: &str = "-";

fn money(value: Decimal) -> String {
    format!(
        "{:.2}",
        value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
    )
}

fn day(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Client block printed in the document header.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientBlock {
    pub name: String,
    pub code: Option<String>,
    pub tax_id: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

impl From<&Client> for ClientBlock {
    fn from(client: &Client) -> Self {
        Self {
            name: client.name.clone(),
            code: client.code.clone(),
            tax_id: client.tax_id.clone(),
            address: client.address.clone(),
            phone: client.phone.clone(),
            email: client.email.clone(),
        }
    }
}

/// One table row per work report line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentLine {
    pub position: usize,
    pub component_name: String,
    pub quantity: String,
    pub unit: String,
    pub length: Option<String>,
    pub weight: Option<String>,
    /// `None` when no price applied; printed as a dash.
    pub unit_price: Option<String>,
    pub value: String,
    pub notes: Option<String>,
}

impl DocumentLine {
    fn new(position: usize, item: &WorkReportItem, line: &LineValue) -> Self {
        Self {
            position,
            component_name: item.component_name.clone(),
            quantity: item.quantity.normalize().to_string(),
            unit: item.unit().label().to_string(),
            length: item.length.map(|l| l.normalize().to_string()),
            weight: item.weight.map(|w| w.normalize().to_string()),
            unit_price: line.unit_price.map(money),
            value: money(line.value),
            notes: item.notes.clone(),
        }
    }
}

fn document_lines(
    report: &WorkReportWithItems,
    prices: &PriceBook,
) -> (Vec<DocumentLine>, Valuation) {
    let values = value_lines(
        &report.items,
        report.report.project_id,
        report.report.report_date,
        prices,
    );
    let lines = report
        .items
        .iter()
        .zip(values.iter())
        .enumerate()
        .map(|(i, (item, line))| DocumentLine::new(i + 1, item, line))
        .collect();
    (lines, Valuation::from_lines(&values))
}

/// Printable work report ("proces verbal").
#[derive(Debug, Clone, Serialize)]
pub struct WorkReportDocument {
    pub title: String,
    pub number: String,
    pub report_date: String,
    pub work_type: String,
    pub status: String,
    pub client: ClientBlock,
    pub project: String,
    pub location: Option<String>,
    pub notes: Option<String>,
    pub lines: Vec<DocumentLine>,
    pub total: String,
    pub currency: String,
    pub price_missing: bool,
    pub unpriced_lines: usize,
}

impl WorkReportDocument {
    /// Lines are valued at the report date.
    pub fn build(
        report: &WorkReportWithItems,
        client: &Client,
        project: &Project,
        prices: &PriceBook,
        currency: &str,
    ) -> Self {
        let (lines, valuation) = document_lines(report, prices);
        Self {
            title: WORK_REPORT_TITLE.to_string(),
            number: report.report.number.clone(),
            report_date: day(report.report.report_date),
            work_type: report.report.work_type().label().to_string(),
            status: report.report.status().label().to_string(),
            client: ClientBlock::from(client),
            project: project.name.clone(),
            location: report.report.location.clone(),
            notes: report.report.notes.clone(),
            lines,
            total: money(valuation.total),
            currency: currency.to_string(),
            price_missing: valuation.price_missing,
            unpriced_lines: valuation.unpriced_lines,
        }
    }
}

/// Work report section inside a proforma.
#[derive(Debug, Clone, Serialize)]
pub struct ProformaSection {
    pub work_report_id: Uuid,
    pub work_report_number: String,
    pub report_date: String,
    pub work_type: String,
    pub project: String,
    pub lines: Vec<DocumentLine>,
    pub subtotal: String,
}

/// Printable proforma invoice.
#[derive(Debug, Clone, Serialize)]
pub struct ProformaDocument {
    pub title: String,
    pub number: String,
    pub issue_date: String,
    pub due_date: Option<String>,
    pub client: ClientBlock,
    pub sections: Vec<ProformaSection>,
    pub notes: Option<String>,
    pub total: String,
    pub currency: String,
    pub price_missing: bool,
    pub unpriced_lines: usize,
}

impl ProformaDocument {
    /// Each section is valued at its own report date. A proforma without
    /// an issue date prints its creation day.
    pub fn build(
        details: &ProformaDetails,
        projects: &[Project],
        prices: &PriceBook,
        currency: &str,
    ) -> Self {
        let mut total = Valuation::default();
        let sections = details
            .items
            .iter()
            .map(|entry| {
                let report = &entry.work_report;
                let (lines, valuation) = document_lines(report, prices);
                total.merge(&valuation);
                ProformaSection {
                    work_report_id: report.report.work_report_id,
                    work_report_number: report.report.number.clone(),
                    report_date: day(report.report.report_date),
                    work_type: report.report.work_type().label().to_string(),
                    project: projects
                        .iter()
                        .find(|p| p.project_id == report.report.project_id)
                        .map_or_else(|| PLACEHOLDER.to_string(), |p| p.name.clone()),
                    lines,
                    subtotal: money(valuation.total),
                }
            })
            .collect();

        let issue_date = details
            .proforma
            .issue_date
            .unwrap_or_else(|| details.proforma.created_utc.date_naive());

        Self {
            title: PROFORMA_TITLE.to_string(),
            number: details.proforma.number.clone(),
            issue_date: day(issue_date),
            due_date: details.proforma.due_date.map(day),
            client: ClientBlock::from(&details.client),
            sections,
            notes: details.proforma.notes.clone(),
            total: money(total.total),
            currency: currency.to_string(),
            price_missing: total.price_missing,
            unpriced_lines: total.unpriced_lines,
        }
    }
}

/// Supplier block of a contract, as stored on the contract.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SupplierBlock {
    pub name: String,
    pub tax_id: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub bank_account: Option<String>,
    pub bank_name: Option<String>,
}

impl From<&Contract> for SupplierBlock {
    fn from(contract: &Contract) -> Self {
        Self {
            name: contract.supplier_name.clone(),
            tax_id: contract.supplier_tax_id.clone(),
            address: contract.supplier_address.clone(),
            phone: contract.supplier_phone.clone(),
            email: contract.supplier_email.clone(),
            bank_account: contract.supplier_bank_account.clone(),
            bank_name: contract.supplier_bank_name.clone(),
        }
    }
}

/// Printable rental contract.
#[derive(Debug, Clone, Serialize)]
pub struct ContractDocument {
    pub title: String,
    pub number: String,
    pub contract_date: String,
    pub supplier: SupplierBlock,
    pub client: ClientBlock,
    pub subject: String,
    pub location: Option<String>,
    pub start_date: String,
    pub end_date: String,
    pub terms: Vec<String>,
}

impl ContractDocument {
    /// Own terms are printed one per non-blank line; without them the
    /// standard terms apply.
    pub fn build(contract: &Contract, client: &Client) -> Self {
        let terms: Vec<String> = contract
            .terms
            .as_deref()
            .map(|t| {
                t.lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        let terms = if terms.is_empty() {
            DEFAULT_CONTRACT_TERMS
                .iter()
                .enumerate()
                .map(|(i, t)| format!("{}. {}", i + 1, t))
                .collect()
        } else {
            terms
        };

        Self {
            title: CONTRACT_TITLE.to_string(),
            number: contract.number.clone(),
            contract_date: day(contract.contract_date),
            supplier: SupplierBlock::from(contract),
            client: ClientBlock::from(client),
            subject: contract
                .description
                .clone()
                .filter(|d| !d.trim().is_empty())
                .unwrap_or_else(|| CONTRACT_SUBJECT.to_string()),
            location: contract.location.clone(),
            start_date: day(contract.start_date),
            end_date: contract
                .end_date
                .map_or_else(|| INDEFINITE_PERIOD.to_string(), day),
            terms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billing::pricing::tests::{date, pricing};
    use crate::billing::valuation::tests::{item, report};
    use crate::models::{ProformaInvoice, ProformaInvoiceItem, ProformaItemDetails};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn client() -> Client {
        Client {
            client_id: Uuid::new_v4(),
            name: "Construct SRL".to_string(),
            code: Some("CS".to_string()),
            tax_id: Some("RO123456".to_string()),
            address: None,
            phone: None,
            email: None,
            notes: None,
            created_utc: Utc::now(),
            updated_utc: Utc::now(),
            deleted_utc: None,
        }
    }

    fn project(client_id: Uuid) -> Project {
        Project {
            project_id: Uuid::new_v4(),
            client_id,
            name: "Bloc A".to_string(),
            code: None,
            location: None,
            description: None,
            created_utc: Utc::now(),
            updated_utc: Utc::now(),
            deleted_utc: None,
        }
    }

    #[test]
    fn money_rounds_half_away_from_zero() {
        assert_eq!(money(dec!(2.345)), "2.35");
        assert_eq!(money(dec!(50)), "50.00");
        assert_eq!(money(dec!(0.005)), "0.01");
    }

    #[test]
    fn work_report_document_is_fully_resolved() {
        let c = client();
        let p = project(c.client_id);
        let component = Uuid::new_v4();
        let book = PriceBook::new(vec![pricing(
            p.project_id,
            component,
            dec!(10.00),
            date(2024, 1, 1),
            None,
        )]);
        let r = report(p.project_id, date(2024, 2, 1), vec![item(component, dec!(5))]);

        let doc = WorkReportDocument::build(&r, &c, &p, &book, "RON");

        assert_eq!(doc.title, "PROCES VERBAL");
        assert_eq!(doc.report_date, "01.02.2024");
        assert_eq!(doc.work_type, "Instalare");
        assert_eq!(doc.status, "Draft");
        assert_eq!(doc.project, "Bloc A");
        assert_eq!(doc.lines.len(), 1);
        assert_eq!(doc.lines[0].position, 1);
        assert_eq!(doc.lines[0].quantity, "5");
        assert_eq!(doc.lines[0].unit, "buc");
        assert_eq!(doc.lines[0].unit_price.as_deref(), Some("10.00"));
        assert_eq!(doc.lines[0].value, "50.00");
        assert_eq!(doc.total, "50.00");
        assert_eq!(doc.currency, "RON");
        assert!(!doc.price_missing);
        assert_eq!(doc.unpriced_lines, 0);
    }

    #[test]
    fn unpriced_lines_are_flagged_and_counted() {
        let c = client();
        let p = project(c.client_id);
        let r = report(
            p.project_id,
            date(2024, 2, 1),
            vec![item(Uuid::new_v4(), dec!(3)), item(Uuid::new_v4(), dec!(1))],
        );

        let doc = WorkReportDocument::build(&r, &c, &p, &PriceBook::default(), "EUR");

        assert_eq!(doc.lines[0].unit_price, None);
        assert_eq!(doc.lines[0].value, "0.00");
        assert_eq!(doc.total, "0.00");
        assert_eq!(doc.currency, "EUR");
        assert!(doc.price_missing);
        assert_eq!(doc.unpriced_lines, 2);
    }

    #[test]
    fn proforma_document_has_a_section_per_report() {
        let c = client();
        let p = project(c.client_id);
        let component = Uuid::new_v4();
        let book = PriceBook::new(vec![
            pricing(p.project_id, component, dec!(10), date(2024, 1, 1), Some(date(2024, 6, 30))),
            pricing(p.project_id, component, dec!(12.5), date(2024, 7, 1), None),
        ]);
        let reports = vec![
            report(p.project_id, date(2024, 3, 1), vec![item(component, dec!(2))]),
            report(p.project_id, date(2024, 8, 1), vec![item(component, dec!(2))]),
        ];
        let proforma = ProformaInvoice {
            proforma_invoice_id: Uuid::new_v4(),
            number: "PF-7".to_string(),
            client_id: c.client_id,
            issue_date: Some(date(2024, 9, 15)),
            due_date: None,
            notes: None,
            created_utc: Utc::now(),
            deleted_utc: None,
        };
        let items = reports
            .into_iter()
            .enumerate()
            .map(|(i, work_report)| ProformaItemDetails {
                item: ProformaInvoiceItem {
                    proforma_invoice_item_id: Uuid::new_v4(),
                    proforma_invoice_id: proforma.proforma_invoice_id,
                    work_report_id: work_report.report.work_report_id,
                    sort_order: i as i32,
                    created_utc: Utc::now(),
                },
                work_report,
            })
            .collect();
        let details = ProformaDetails {
            proforma,
            client: c,
            items,
        };

        let doc = ProformaDocument::build(&details, &[p], &book, "RON");

        assert_eq!(doc.title, "FACTURĂ PROFORMĂ");
        assert_eq!(doc.issue_date, "15.09.2024");
        assert_eq!(doc.due_date, None);
        assert_eq!(doc.sections.len(), 2);
        assert_eq!(doc.sections[0].subtotal, "20.00");
        assert_eq!(doc.sections[1].subtotal, "25.00");
        assert_eq!(doc.sections[1].project, "Bloc A");
        assert_eq!(doc.total, "45.00");
        assert!(!doc.price_missing);
        assert_eq!(doc.unpriced_lines, 0);
    }

    fn contract(client_id: Uuid) -> Contract {
        Contract {
            contract_id: Uuid::new_v4(),
            number: "C-12".to_string(),
            client_id,
            contract_date: date(2024, 2, 20),
            start_date: date(2024, 3, 1),
            end_date: None,
            location: Some("Cluj-Napoca".to_string()),
            description: None,
            terms: None,
            supplier_name: "A.D. SCHELE".to_string(),
            supplier_tax_id: Some("RO111".to_string()),
            supplier_address: None,
            supplier_phone: None,
            supplier_email: None,
            supplier_bank_account: None,
            supplier_bank_name: None,
            notes: None,
            created_utc: Utc::now(),
            updated_utc: Utc::now(),
            deleted_utc: None,
        }
    }

    #[test]
    fn contract_without_own_text_uses_standard_wording() {
        let c = client();
        let k = contract(c.client_id);

        let doc = ContractDocument::build(&k, &c);

        assert_eq!(doc.title, "CONTRACT DE ÎNCHIRIERE SCHELE");
        assert_eq!(doc.contract_date, "20.02.2024");
        assert_eq!(doc.start_date, "01.03.2024");
        assert_eq!(doc.end_date, "Nedeterminată");
        assert_eq!(
            doc.subject,
            "Închirierea de echipamente de schele pentru lucrări de construcție."
        );
        assert_eq!(doc.terms.len(), 5);
        assert!(doc.terms[0].starts_with("1. Proprietarul"));
        assert!(doc.terms[4].starts_with("5. Contractul"));
        assert_eq!(doc.supplier.name, "A.D. SCHELE");
        assert_eq!(doc.supplier.tax_id.as_deref(), Some("RO111"));
        assert_eq!(doc.client.name, "Construct SRL");
    }

    #[test]
    fn contract_own_terms_and_period_are_printed() {
        let c = client();
        let mut k = contract(c.client_id);
        k.end_date = Some(date(2024, 12, 31));
        k.description = Some("Schele fațadă bloc A".to_string());
        k.terms = Some("Plata lunară.\n\n  Garanție 10%.  ".to_string());

        let doc = ContractDocument::build(&k, &c);

        assert_eq!(doc.end_date, "31.12.2024");
        assert_eq!(doc.subject, "Schele fațadă bloc A");
        assert_eq!(doc.terms, vec!["Plata lunară.", "Garanție 10%."]);
    }
}
