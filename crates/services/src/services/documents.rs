//! PDF documents issued to a lead: invoice, training agreement and
//! attendance certificate.

use chrono::{NaiveDate, Utc};
use db::models::{
    accounting_entry::{AccountingEntry, EntryKind, PaymentMethod},
    lead::Lead,
    planning::Planning,
};
use lopdf::{
    Document, Object, ObjectId, Stream,
    content::{Content, Operation},
    dictionary,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use strum_macros::{Display, EnumString};
use thiserror::Error;
use ts_rs::TS;
use utils::money::format_cents;
use uuid::Uuid;

use super::{accounting::summarize, config::SchoolProfile};

const PAGE_WIDTH: i64 = 595;
const PAGE_HEIGHT: i64 = 842;
const MARGIN_X: i64 = 56;
const MARGIN_TOP: i64 = 60;
const MARGIN_BOTTOM: i64 = 64;
const BODY_SIZE: i64 = 11;

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("pdf error: {0}")]
    Pdf(#[from] lopdf::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("lead not found")]
    LeadNotFound,
    #[error("a {0} needs the lead to be enrolled on a session")]
    NoSession(DocumentKind),
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DocumentKind {
    Invoice,
    Agreement,
    Certificate,
}

impl DocumentKind {
    pub fn title(&self) -> &'static str {
        match self {
            DocumentKind::Invoice => "FACTURE",
            DocumentKind::Agreement => "CONVENTION DE FORMATION",
            DocumentKind::Certificate => "ATTESTATION DE FORMATION",
        }
    }

    fn file_prefix(&self) -> &'static str {
        match self {
            DocumentKind::Invoice => "facture",
            DocumentKind::Agreement => "convention",
            DocumentKind::Certificate => "attestation",
        }
    }

    fn requires_session(&self) -> bool {
        matches!(self, DocumentKind::Agreement | DocumentKind::Certificate)
    }

    /// Download name, e.g. `facture-dupont-marie.pdf`
    pub fn file_name(&self, lead: &Lead) -> String {
        let slug = slugify(&format!("{} {}", lead.last_name, lead.first_name));
        if slug.is_empty() {
            format!("{}.pdf", self.file_prefix())
        } else {
            format!("{}-{slug}.pdf", self.file_prefix())
        }
    }
}

/// Everything a document prints
#[derive(Debug, Clone)]
pub struct DocumentContext {
    pub school: SchoolProfile,
    pub lead: Lead,
    pub session: Option<Planning>,
    pub entries: Vec<AccountingEntry>,
    pub issued_on: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Font {
    Regular,
    Bold,
}

impl Font {
    fn resource(&self) -> &'static str {
        match self {
            Font::Regular => "F1",
            Font::Bold => "F2",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Line {
    font: Font,
    size: i64,
    text: String,
    /// Extra space above the line, in points
    space_before: i64,
}

impl Line {
    fn new(font: Font, size: i64, text: impl Into<String>) -> Self {
        Self {
            font,
            size,
            text: text.into(),
            space_before: 0,
        }
    }

    fn spaced(mut self, space_before: i64) -> Self {
        self.space_before = space_before;
        self
    }

    fn height(&self) -> i64 {
        self.space_before + self.size + self.size / 3
    }
}

/// Maps text to WinAnsiEncoding bytes; characters it cannot represent become `?`.
pub fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            '\u{20}'..='\u{7e}' => c as u8,
            '\u{a0}'..='\u{ff}' => c as u32 as u8,
            '€' => 0x80,
            '‚' => 0x82,
            '…' => 0x85,
            'Œ' => 0x8c,
            '‘' => 0x91,
            '’' => 0x92,
            '“' => 0x93,
            '”' => 0x94,
            '•' => 0x95,
            '–' => 0x96,
            '—' => 0x97,
            'œ' => 0x9c,
            'Ÿ' => 0x9f,
            '\u{202f}' => b' ',
            _ => b'?',
        })
        .collect()
}

/// Greedy word wrap on an estimated average glyph width of half the font size.
/// Words longer than a line are hard-split.
pub fn wrap_text(text: &str, size: i64, width: i64) -> Vec<String> {
    let max_chars = usize::try_from((width * 2 / size.max(1)).max(1)).unwrap_or(1);
    let mut lines = Vec::new();

    for paragraph in text.split('\n') {
        let mut current = String::new();
        let mut current_len = 0;
        for word in paragraph.split_whitespace() {
            let chars: Vec<char> = word.chars().collect();
            for chunk in chars.chunks(max_chars) {
                let needed = if current_len == 0 {
                    chunk.len()
                } else {
                    current_len + 1 + chunk.len()
                };
                if needed > max_chars && current_len > 0 {
                    lines.push(std::mem::take(&mut current));
                    current_len = 0;
                }
                if current_len > 0 {
                    current.push(' ');
                    current_len += 1;
                }
                current.extend(chunk);
                current_len += chunk.len();
            }
        }
        lines.push(current);
    }
    lines
}

fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for c in text.chars().flat_map(char::to_lowercase) {
        let c = match c {
            'à' | 'â' | 'ä' => 'a',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'î' | 'ï' => 'i',
            'ô' | 'ö' => 'o',
            'ù' | 'û' | 'ü' => 'u',
            'ç' => 'c',
            other => other,
        };
        if c.is_ascii_alphanumeric() {
            slug.push(c);
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    slug.trim_end_matches('-').to_string()
}

fn format_date(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

fn kind_label(kind: EntryKind) -> &'static str {
    match kind {
        EntryKind::Deposit => "Acompte",
        EntryKind::Balance => "Solde",
        EntryKind::FullPayment => "Paiement intégral",
    }
}

fn method_label(method: PaymentMethod) -> &'static str {
    match method {
        PaymentMethod::Card => "carte",
        PaymentMethod::Transfer => "virement",
        PaymentMethod::Cash => "espèces",
        PaymentMethod::Cheque => "chèque",
    }
}

pub struct DocumentRenderer;

impl DocumentRenderer {
    pub fn render(kind: DocumentKind, ctx: &DocumentContext) -> Result<Vec<u8>, DocumentError> {
        let session = match (&ctx.session, kind.requires_session()) {
            (None, true) => return Err(DocumentError::NoSession(kind)),
            (session, _) => session.as_ref(),
        };

        let mut lines = header_lines(&ctx.school);
        lines.push(Line::new(Font::Bold, 18, kind.title()).spaced(24));
        lines.push(Line::new(
            Font::Regular,
            9,
            format!("Émis le {}", format_date(ctx.issued_on)),
        ));
        lines.extend(student_lines(ctx, session));

        match kind {
            DocumentKind::Invoice => lines.extend(invoice_lines(ctx)),
            DocumentKind::Agreement => lines.extend(agreement_lines(ctx)),
            DocumentKind::Certificate => lines.extend(certificate_lines(ctx)),
        }

        let pages = paginate(lines);
        build_pdf(&pages)
    }
}

fn header_lines(school: &SchoolProfile) -> Vec<Line> {
    let mut lines = vec![Line::new(Font::Bold, 16, school.name.clone())];
    for detail in [&school.address, &school.email, &school.phone].into_iter().flatten() {
        lines.push(Line::new(Font::Regular, 9, detail.clone()));
    }
    if let Some(siret) = &school.siret {
        lines.push(Line::new(Font::Regular, 9, format!("SIRET : {siret}")));
    }
    lines
}

fn student_lines(ctx: &DocumentContext, session: Option<&Planning>) -> Vec<Line> {
    let mut lines = vec![
        Line::new(
            Font::Bold,
            BODY_SIZE,
            format!("Stagiaire : {}", ctx.lead.full_name()),
        )
        .spaced(18),
        Line::new(
            Font::Regular,
            BODY_SIZE,
            format!("Formation : {}", ctx.lead.formation),
        ),
    ];
    if let Some(email) = &ctx.lead.email {
        lines.push(Line::new(Font::Regular, BODY_SIZE, format!("Email : {email}")));
    }
    if let Some(session) = session {
        let dates: Vec<String> = session.session_dates.0.iter().map(|d| format_date(*d)).collect();
        for text in wrap_text(
            &format!("Dates : {}", dates.join(", ")),
            BODY_SIZE,
            PAGE_WIDTH - 2 * MARGIN_X,
        ) {
            lines.push(Line::new(Font::Regular, BODY_SIZE, text));
        }
        if let Some(location) = &session.location {
            lines.push(Line::new(Font::Regular, BODY_SIZE, format!("Lieu : {location}")));
        }
    }
    lines
}

fn invoice_lines(ctx: &DocumentContext) -> Vec<Line> {
    let summary = summarize(&ctx.lead, ctx.entries.clone());
    let mut lines = vec![Line::new(Font::Bold, 12, "Règlements").spaced(18)];

    if summary.entries.is_empty() {
        lines.push(Line::new(Font::Regular, BODY_SIZE, "Aucun règlement enregistré."));
    }
    for entry in &summary.entries {
        let status = match entry.paid_at {
            Some(paid_at) => format!("réglé le {}", format_date(paid_at.date_naive())),
            None => "en attente".to_string(),
        };
        lines.push(Line::new(
            Font::Regular,
            BODY_SIZE,
            format!(
                "{} ({}) : {} - {}",
                kind_label(entry.kind),
                method_label(entry.method),
                format_cents(entry.amount_cents),
                status
            ),
        ));
    }

    lines.push(Line::new(Font::Bold, BODY_SIZE, format!("Total réglé : {}", format_cents(summary.paid_cents))).spaced(12));
    if let Some(price) = summary.fixed_price_cents {
        lines.push(Line::new(
            Font::Regular,
            BODY_SIZE,
            format!("Prix de la formation : {}", format_cents(price)),
        ));
    }
    if let Some(due) = summary.balance_due_cents {
        lines.push(Line::new(
            Font::Bold,
            BODY_SIZE,
            format!("Reste à payer : {}", format_cents(due)),
        ));
    }
    lines
}

fn paragraph(text: &str) -> Vec<Line> {
    wrap_text(text, BODY_SIZE, PAGE_WIDTH - 2 * MARGIN_X)
        .into_iter()
        .enumerate()
        .map(|(i, text)| {
            let line = Line::new(Font::Regular, BODY_SIZE, text);
            if i == 0 { line.spaced(10) } else { line }
        })
        .collect()
}

fn agreement_lines(ctx: &DocumentContext) -> Vec<Line> {
    let price = ctx
        .lead
        .fixed_price_cents
        .map(format_cents)
        .unwrap_or_else(|| "à définir".to_string());
    let mut lines = vec![Line::new(Font::Bold, 12, "Conditions").spaced(18)];
    for text in [
        format!(
            "Entre {school}, organisme de formation, et {student}, ci-après le stagiaire, \
             il est convenu ce qui suit.",
            school = ctx.school.name,
            student = ctx.lead.full_name()
        ),
        format!(
            "Article 1 - Objet. Le stagiaire suit la formation « {} » aux dates indiquées \
             ci-dessus. Les horaires sont communiqués avant le début de la session.",
            ctx.lead.formation
        ),
        format!(
            "Article 2 - Prix. Le prix de la formation est de {price}. Un acompte confirme \
             l'inscription ; le solde est dû au plus tard le premier jour de la session."
        ),
        "Article 3 - Annulation. Toute annulation doit être notifiée par écrit. L'acompte \
         reste acquis à l'organisme en cas d'annulation moins de quatorze jours avant la \
         session."
            .to_string(),
        "Article 4 - Attestation. Une attestation de formation est remise au stagiaire à \
         l'issue de la session."
            .to_string(),
    ] {
        lines.extend(paragraph(&text));
    }
    lines.push(Line::new(Font::Regular, BODY_SIZE, "Signature de l'organisme").spaced(36));
    lines.push(Line::new(Font::Regular, BODY_SIZE, "Signature du stagiaire"));
    lines
}

fn certificate_lines(ctx: &DocumentContext) -> Vec<Line> {
    let (start, end) = ctx
        .session
        .as_ref()
        .map(|s| (format_date(s.start_date), format_date(s.end_date)))
        .unwrap_or_default();
    let mut lines = paragraph(&format!(
        "{school} atteste que {student} a suivi la formation « {formation} » du {start} au {end}.",
        school = ctx.school.name,
        student = ctx.lead.full_name(),
        formation = ctx.lead.formation,
    ));
    lines.extend(paragraph(
        "Cette attestation est délivrée pour servir et valoir ce que de droit.",
    ));
    lines.push(Line::new(Font::Regular, BODY_SIZE, format!("Fait le {}", format_date(ctx.issued_on))).spaced(36));
    lines
}

/// Splits lines into pages that fit between the top and bottom margins.
fn paginate(lines: Vec<Line>) -> Vec<Vec<Line>> {
    let usable = PAGE_HEIGHT - MARGIN_TOP - MARGIN_BOTTOM;
    let mut pages = vec![Vec::new()];
    let mut used = 0;

    for mut line in lines {
        let is_first = pages.last().is_none_or(Vec::is_empty);
        if !is_first && used + line.height() > usable {
            pages.push(Vec::new());
            used = 0;
            line.space_before = 0;
        }
        used += line.height();
        if let Some(page) = pages.last_mut() {
            page.push(line);
        }
    }
    pages
}

fn text_operations(line: &Line, x: i64, y: i64) -> Vec<Operation> {
    vec![
        Operation::new("BT", vec![]),
        Operation::new(
            "Tf",
            vec![line.font.resource().into(), Object::Integer(line.size)],
        ),
        Operation::new("Td", vec![Object::Integer(x), Object::Integer(y)]),
        Operation::new("Tj", vec![Object::string_literal(encode_win_ansi(&line.text))]),
        Operation::new("ET", vec![]),
    ]
}

fn page_content(lines: &[Line], page_number: usize, page_count: usize) -> Vec<Operation> {
    let mut operations = Vec::new();
    let mut y = PAGE_HEIGHT - MARGIN_TOP;
    for line in lines {
        y -= line.height();
        operations.extend(text_operations(line, MARGIN_X, y));
    }

    let footer = Line::new(Font::Regular, 8, format!("Page {page_number} / {page_count}"));
    operations.extend(text_operations(&footer, PAGE_WIDTH - MARGIN_X - 48, MARGIN_BOTTOM / 2));
    operations
}

fn font(base: &str) -> lopdf::Dictionary {
    dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => base,
        "Encoding" => "WinAnsiEncoding",
    }
}

fn build_pdf(pages: &[Vec<Line>]) -> Result<Vec<u8>, DocumentError> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let regular_id = doc.add_object(font("Helvetica"));
    let bold_id = doc.add_object(font("Helvetica-Bold"));
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => regular_id,
            "F2" => bold_id,
        },
    });

    let mut kids: Vec<Object> = Vec::with_capacity(pages.len());
    for (index, lines) in pages.iter().enumerate() {
        let content = Content {
            operations: page_content(lines, index + 1, pages.len()),
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));
        let page_id: ObjectId = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = i64::try_from(kids.len()).unwrap_or(i64::MAX);
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => Object::Integer(count),
            "Resources" => resources_id,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(PAGE_WIDTH),
                Object::Integer(PAGE_HEIGHT),
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
    doc.save_to(&mut bytes)?;
    Ok(bytes)
}

/// Loads what a document needs from the database and renders it
#[derive(Clone)]
pub struct DocumentService {
    pool: SqlitePool,
    school: SchoolProfile,
}

impl DocumentService {
    pub fn new(pool: SqlitePool, school: SchoolProfile) -> Self {
        Self { pool, school }
    }

    pub async fn context(&self, lead_id: Uuid) -> Result<DocumentContext, DocumentError> {
        let lead = Lead::find_by_id(&self.pool, lead_id)
            .await?
            .ok_or(DocumentError::LeadNotFound)?;
        // Latest session the lead is enrolled on
        let session = Planning::find_by_lead_id(&self.pool, lead_id)
            .await?
            .into_iter()
            .last();
        let entries = AccountingEntry::find_by_lead_id(&self.pool, lead_id).await?;

        Ok(DocumentContext {
            school: self.school.clone(),
            lead,
            session,
            entries,
            issued_on: Utc::now().date_naive(),
        })
    }

    /// Returns the file name and the PDF bytes
    pub async fn generate(&self, lead_id: Uuid, kind: DocumentKind) -> Result<(String, Vec<u8>), DocumentError> {
        let ctx = self.context(lead_id).await?;
        let bytes = DocumentRenderer::render(kind, &ctx)?;
        tracing::info!(
            lead_id = %lead_id,
            kind = %kind,
            size = bytes.len(),
            "Document generated"
        );
        Ok((kind.file_name(&ctx.lead), bytes))
    }
}

#[cfg(test)]
mod tests {
    use db::models::{lead::LeadStatus, planning::FormationFormat};
    use sqlx::types::Json;

    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn lead() -> Lead {
        Lead {
            id: Uuid::new_v4(),
            first_name: "Élodie".to_string(),
            last_name: "Dupont".to_string(),
            email: Some("elodie@mail.fr".to_string()),
            phone: None,
            formation: "Microblading".to_string(),
            source: None,
            status: LeadStatus::Won,
            closer_id: None,
            fixed_price_cents: Some(180_000),
            notes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn session() -> Planning {
        Planning {
            id: Uuid::new_v4(),
            formation: "Microblading".to_string(),
            format: FormationFormat::TwoDays,
            weekday: 5,
            start_date: date(2025, 6, 7),
            end_date: date(2025, 6, 8),
            session_dates: Json(vec![date(2025, 6, 7), date(2025, 6, 8)]),
            location: Some("Bordeaux".to_string()),
            trainer_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn context(session: Option<Planning>, entries: Vec<AccountingEntry>) -> DocumentContext {
        DocumentContext {
            school: SchoolProfile {
                name: "Académie Beauté".to_string(),
                siret: Some("123 456 789 00010".to_string()),
                ..Default::default()
            },
            lead: lead(),
            session,
            entries,
            issued_on: date(2025, 6, 1),
        }
    }

    fn entry(lead_id: Uuid, amount_cents: i64, paid: bool) -> AccountingEntry {
        AccountingEntry {
            id: Uuid::new_v4(),
            lead_id,
            kind: EntryKind::Deposit,
            amount_cents,
            method: PaymentMethod::Card,
            paid,
            paid_at: paid.then(Utc::now),
            note: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn encodes_french_text_as_win_ansi() {
        assert_eq!(encode_win_ansi("Prix : 10 €"), b"Prix : 10 \x80".to_vec());
        assert_eq!(encode_win_ansi("é"), vec![0xe9]);
        assert_eq!(encode_win_ansi("l’œil"), vec![b'l', 0x92, 0x9c, b'i', b'l']);
        assert_eq!(encode_win_ansi("日"), vec![b'?']);
    }

    #[test]
    fn wraps_on_word_boundaries() {
        let lines = wrap_text("un deux trois quatre cinq", 10, 60);
        // 60 * 2 / 10 = 12 characters per line
        assert_eq!(lines, vec!["un deux", "trois quatre", "cinq"]);
        assert_eq!(wrap_text("a\n\nb", 10, 60), vec!["a", "", "b"]);
    }

    #[test]
    fn long_words_are_split_to_fit_the_line() {
        let lines = wrap_text("mail: jean.dupont@exemple-de-domaine.fr", 10, 60);
        assert_eq!(
            lines,
            vec!["mail:", "jean.dupont@", "exemple-de-d", "omaine.fr"]
        );
        assert!(lines.iter().all(|l| l.chars().count() <= 12));
    }

    #[test]
    fn file_name_is_ascii() {
        assert_eq!(DocumentKind::Invoice.file_name(&lead()), "facture-dupont-elodie.pdf");
        assert_eq!("certificate".parse::<DocumentKind>().unwrap(), DocumentKind::Certificate);
    }

    #[test]
    fn renders_single_page_invoice() {
        let ctx = context(None, vec![]);
        let lead_id = ctx.lead.id;
        let ctx = DocumentContext {
            entries: vec![entry(lead_id, 50_000, true), entry(lead_id, 130_000, false)],
            ..ctx
        };
        let bytes = DocumentRenderer::render(DocumentKind::Invoice, &ctx).unwrap();
        assert!(bytes.starts_with(b"%PDF-1.5"));
        let doc = Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
    }

    #[test]
    fn agreement_and_certificate_need_a_session() {
        let err = DocumentRenderer::render(DocumentKind::Certificate, &context(None, vec![]))
            .unwrap_err();
        assert!(matches!(err, DocumentError::NoSession(DocumentKind::Certificate)));

        let bytes =
            DocumentRenderer::render(DocumentKind::Agreement, &context(Some(session()), vec![]))
                .unwrap();
        assert!(!Document::load_mem(&bytes).unwrap().get_pages().is_empty());
    }

    #[test]
    fn long_invoices_span_several_pages() {
        let ctx = context(Some(session()), vec![]);
        let lead_id = ctx.lead.id;
        let entries = (0..80).map(|_| entry(lead_id, 1_000, false)).collect();
        let ctx = DocumentContext { entries, ..ctx };

        let bytes = DocumentRenderer::render(DocumentKind::Invoice, &ctx).unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        assert!(doc.get_pages().len() >= 2);
    }

    #[test]
    fn pagination_drops_leading_space_on_new_pages() {
        let lines = (0..100)
            .map(|i| Line::new(Font::Regular, BODY_SIZE, format!("ligne {i}")).spaced(4))
            .collect();
        let pages = paginate(lines);
        assert!(pages.len() > 1);
        assert!(pages.iter().skip(1).all(|p| p[0].space_before == 0));
        let usable = PAGE_HEIGHT - MARGIN_TOP - MARGIN_BOTTOM;
        assert!(pages.iter().all(|p| p.iter().map(Line::height).sum::<i64>() <= usable));
    }
}
