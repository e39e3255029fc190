// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Ticket rendering for 80 mm thermal printers.
//
// Turns a job's kind + payload into plain text laid out for a fixed character
// width, then frames it with ESC/POS commands. Any payload that cannot be
// rendered is a `RelayError::Render`, which the dispatcher treats as terminal:
// the same malformed payload will never render on a retry.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use printrelay_core::error::{RelayError, Result};
use printrelay_core::types::{JobId, JobKind, PrintJob};

const ESC: u8 = 0x1B;
const GS: u8 = 0x1D;

/// A rendered ticket, ready for a print sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    pub job_id: JobId,
    pub kind: JobKind,
    /// Spooler job title, e.g. `KOT-1042`.
    pub title: String,
    /// Laid-out body text, one `\n` per printed line.
    pub text: String,
}

impl Ticket {
    /// ESC/POS byte stream: initialise, large bold tag, body, feed, cut.
    pub fn escpos(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.text.len() + 32);
        out.extend_from_slice(&[ESC, b'@']); // initialise
        out.extend_from_slice(&[ESC, b'a', 1]); // centre
        out.extend_from_slice(&[ESC, b'!', 16]); // double height
        out.extend_from_slice(&[ESC, b'E', 1]); // bold
        out.push(b'\n');
        out.extend_from_slice(self.kind.ticket_tag().as_bytes());
        out.push(b'\n');
        out.extend_from_slice(&[ESC, b'E', 0]);
        out.extend_from_slice(&[ESC, b'!', 0]);
        out.extend_from_slice(&[ESC, b'a', 0]);
        out.extend(encode_cp437(&self.text));
        out.extend_from_slice(b"\n\n\n");
        out.extend_from_slice(&[GS, b'V', 66, 0]); // partial cut
        out
    }
}

/// Render a job into a ticket `width` characters wide.
///
/// `now` is used for the ticket time when neither the payload nor the job
/// carries one.
pub fn render(job: &PrintJob, width: usize, now: DateTime<Utc>) -> Result<Ticket> {
    if let Some(text) = prerendered(&job.payload)? {
        return Ok(Ticket {
            job_id: job.id.clone(),
            kind: job.kind.clone(),
            title: format!("{}-{}", job.kind.ticket_tag(), job.id),
            text,
        });
    }

    let payload = job.payload.as_object().ok_or_else(|| {
        RelayError::Render(format!("payload for job {} is not an object", job.id))
    })?;
    let stamp = job.created_at.unwrap_or(now);

    let text = match &job.kind {
        JobKind::KitchenOrder => render_station(payload, Station::Kitchen, width, stamp)?,
        JobKind::BarOrder => render_station(payload, Station::Bar, width, stamp)?,
        JobKind::Receipt => render_receipt(payload, width, stamp)?,
        JobKind::Unrecognised(raw) => {
            return Err(RelayError::Render(format!("unsupported job kind '{raw}'")));
        }
    };

    let reference = text_field(payload, &["order_number", "order_id", "order"])
        .unwrap_or_else(|| job.id.to_string());
    Ok(Ticket {
        job_id: job.id.clone(),
        kind: job.kind.clone(),
        title: format!("{}-{}", job.kind.ticket_tag(), reference),
        text,
    })
}

/// Text the server already laid out: either a bare JSON string or an object
/// with a `content` string.
fn prerendered(payload: &Value) -> Result<Option<String>> {
    let content = match payload {
        Value::String(s) => Some(s.as_str()),
        Value::Object(map) => map.get("content").and_then(Value::as_str),
        _ => None,
    };
    match content {
        Some(s) if s.trim().is_empty() => Err(RelayError::Render("ticket content is empty".into())),
        Some(s) => Ok(Some(s.to_string())),
        None => Ok(None),
    }
}

#[derive(Debug, Clone, Copy)]
enum Station {
    Kitchen,
    Bar,
}

impl Station {
    fn title(self) -> &'static str {
        match self {
            Self::Kitchen => "KITCHEN ORDER TICKET (KOT)",
            Self::Bar => "BAR ORDER TICKET (BOT)",
        }
    }

    fn heading(self) -> &'static str {
        match self {
            Self::Kitchen => "KITCHEN ITEMS:",
            Self::Bar => "BAR ITEMS:",
        }
    }

    fn footer(self) -> &'static str {
        match self {
            Self::Kitchen => "For kitchen preparation only",
            Self::Bar => "For bar preparation only",
        }
    }
}

/// A validated order line.
#[derive(Debug)]
struct Item {
    name: String,
    quantity: u64,
    note: Option<String>,
    line_total: Option<f64>,
}

fn render_station(
    payload: &Map<String, Value>,
    station: Station,
    width: usize,
    stamp: DateTime<Utc>,
) -> Result<String> {
    let items = parse_items(payload)?;
    let mut lines = Vec::new();

    lines.push(rule('=', width));
    lines.push(center(station.title(), width));
    lines.push(rule('=', width));
    lines.push(String::new());

    if let Some(restaurant) = text_field(payload, &["restaurant", "restaurant_name"]) {
        lines.push(format!("Restaurant: {restaurant}"));
    }
    if let Some(order) = text_field(payload, &["order_number", "order_id", "order"]) {
        lines.push(format!("Order #: {order}"));
    }
    if let Some(table) = text_field(payload, &["table", "table_number", "tbl_no"]) {
        lines.push(format!("Table: {table}"));
    }
    let time = text_field(payload, &["time"])
        .unwrap_or_else(|| stamp.format("%d/%m/%Y %H:%M").to_string());
    lines.push(format!("Time: {time}"));
    lines.push(String::new());
    lines.push(rule('-', width));
    lines.push(String::new());

    lines.push(station.heading().to_string());
    lines.push(String::new());

    let order_note = text_field(payload, &["notes", "special_instructions"]);
    for item in &items {
        lines.push(format!("{}x {}", item.quantity, item.name));
        let note = item.note.as_ref().or(order_note.as_ref());
        if let Some(note) = note {
            for line in wrap(&format!("Note: {note}"), width.saturating_sub(3)) {
                lines.push(format!("   {line}"));
            }
        }
        lines.push(String::new());
    }

    lines.push(rule('-', width));
    lines.push(format!("Total Items: {}", items.len()));
    lines.push(format!(
        "Total Qty: {}",
        items.iter().map(|i| i.quantity).sum::<u64>()
    ));
    lines.push(String::new());
    lines.push(station.footer().to_string());
    lines.push("NOT FOR BILLING".to_string());
    lines.push(rule('=', width));

    Ok(lines.join("\n"))
}

fn render_receipt(payload: &Map<String, Value>, width: usize, stamp: DateTime<Utc>) -> Result<String> {
    let items = parse_items(payload)?;
    let total = number_field(payload, &["total", "total_amount"])
        .ok_or_else(|| RelayError::Render("receipt has no numeric 'total'".into()))?;
    let currency = text_field(payload, &["currency"]).unwrap_or_else(|| "$".into());
    let money = |v: f64| format!("{currency}{v:.2}");

    let mut lines = Vec::new();

    let restaurant = text_field(payload, &["restaurant", "restaurant_name"])
        .unwrap_or_else(|| "RESTAURANT".into())
        .to_uppercase();
    lines.push(center(&restaurant, width));
    let tagline = text_field(payload, &["description", "restaurant_description"])
        .unwrap_or_else(|| "Cashier Food & Service".into());
    lines.push(center(&tagline, width));
    lines.push(rule('-', width));

    if let Some(number) = text_field(payload, &["receipt_number", "payment_id"]) {
        let label = match number.parse::<u64>() {
            Ok(n) => format!("RECEIPT #{n:06}"),
            Err(_) => format!("RECEIPT #{number}"),
        };
        lines.push(right(&label, width));
    }
    if let Some(order) = text_field(payload, &["order_number", "order_id", "order"]) {
        lines.push(format!("Order: {order}"));
    }
    lines.push(format!("Date: {}", stamp.format("%b %d, %Y")));
    lines.push(format!("Time: {}", stamp.format("%H:%M")));
    let table = text_field(payload, &["table", "table_number", "tbl_no"])
        .unwrap_or_else(|| "Takeaway".into());
    lines.push(format!("Table: {table}"));
    if let Some(cashier) = text_field(payload, &["processed_by", "cashier"]) {
        lines.push(format!("Processed by: {cashier}"));
    }

    lines.push("ITEMS:".to_string());
    let mut computed_subtotal = 0.0;
    for item in &items {
        let label = format!("{}x {}", item.quantity, item.name);
        match item.line_total {
            Some(amount) => {
                computed_subtotal += amount;
                lines.extend(two_col(&label, &money(amount), width));
            }
            None => lines.push(label),
        }
    }
    lines.push(rule('-', width));

    let subtotal = number_field(payload, &["subtotal"]).unwrap_or(computed_subtotal);
    lines.extend(two_col("Subtotal:", &money(subtotal), width));
    if let Some(discount) = number_field(payload, &["discount"]).filter(|d| *d > 0.0) {
        lines.extend(two_col("Discount:", &format!("-{}", money(discount)), width));
    }
    if let Some(tax) = number_field(payload, &["tax", "tax_amount"]) {
        let label = match number_field(payload, &["tax_rate"]) {
            Some(rate) => format!("Tax ({:.1}%):", rate * 100.0),
            None => "Tax:".to_string(),
        };
        lines.extend(two_col(&label, &money(tax), width));
    }
    lines.push(rule('-', width));
    lines.extend(two_col("TOTAL:", &money(total), width));
    lines.push(rule('-', width));

    let method = text_field(payload, &["payment_method"]);
    let paid = number_field(payload, &["amount_paid", "amount"]);
    if method.is_some() || paid.is_some() {
        lines.push("PAYMENT:".to_string());
        if let Some(method) = &method {
            lines.extend(two_col("Method:", &payment_method_label(method), width));
        }
        if let Some(paid) = paid {
            lines.extend(two_col("Amount Paid:", &money(paid), width));
        }
        if let Some(reference) = text_field(payload, &["reference", "reference_number"]) {
            lines.extend(two_col("Reference:", &reference, width));
        }
        if let Some(paid) = paid {
            if method.as_deref() == Some("cash") && paid > total {
                lines.extend(two_col("Change:", &money(paid - total), width));
            }
        }
        if let Some(remaining) = number_field(payload, &["remaining"]).filter(|r| *r > 0.0) {
            lines.extend(two_col("Remaining:", &money(remaining), width));
        }
        lines.push(rule('-', width));
    }

    lines.push(center("Thank you for dining with us!", width));
    lines.push(center("Please come again", width));

    Ok(lines.join("\n"))
}

fn payment_method_label(method: &str) -> String {
    match method {
        "cash" => "Cash".into(),
        "card" => "Card".into(),
        "digital" => "Digital Payment".into(),
        "voucher" => "Voucher".into(),
        other => {
            let mut chars = other.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        }
    }
}

fn parse_items(payload: &Map<String, Value>) -> Result<Vec<Item>> {
    let raw = payload
        .get("items")
        .and_then(Value::as_array)
        .ok_or_else(|| RelayError::Render("payload has no 'items' array".into()))?;
    if raw.is_empty() {
        return Err(RelayError::Render("order has no items".into()));
    }

    raw.iter()
        .enumerate()
        .map(|(idx, value)| {
            let obj = value
                .as_object()
                .ok_or_else(|| RelayError::Render(format!("item {} is not an object", idx + 1)))?;
            let name = text_field(obj, &["name", "product_name", "product"])
                .ok_or_else(|| RelayError::Render(format!("item {} has no name", idx + 1)))?;
            let quantity = obj
                .get("quantity")
                .or_else(|| obj.get("qty"))
                .and_then(Value::as_u64)
                .filter(|q| *q > 0)
                .ok_or_else(|| {
                    RelayError::Render(format!("item '{name}' has no positive quantity"))
                })?;
            let line_total = number_field(obj, &["total", "line_total"])
                .or_else(|| number_field(obj, &["price"]).map(|p| p * quantity as f64));
            Ok(Item {
                name,
                quantity,
                note: text_field(obj, &["note", "notes"]),
                line_total,
            })
        })
        .collect()
}

/// First non-empty string/number found under any of `keys`.
fn text_field(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match map.get(*key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// First finite number (or numeric string, as Django serialises decimals)
/// under any of `keys`. `"NaN"` and `"inf"` do not count.
fn number_field(map: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|key| {
        let value = match map.get(*key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        value.filter(|v| v.is_finite())
    })
}

fn rule(ch: char, width: usize) -> String {
    std::iter::repeat_n(ch, width).collect()
}

fn center(text: &str, width: usize) -> String {
    let len = text.chars().count();
    if len >= width {
        return text.to_string();
    }
    let left = (width - len) / 2;
    let right = width - len - left;
    format!("{}{}{}", " ".repeat(left), text, " ".repeat(right))
}

fn right(text: &str, width: usize) -> String {
    let len = text.chars().count();
    if len >= width {
        return text.to_string();
    }
    format!("{}{}", " ".repeat(width - len), text)
}

/// Label on the left, value flush right. Falls back to two lines when both
/// do not fit with at least one space between them.
fn two_col(label: &str, value: &str, width: usize) -> Vec<String> {
    let used = label.chars().count() + value.chars().count();
    if used < width {
        vec![format!("{label}{}{value}", " ".repeat(width - used))]
    } else {
        vec![label.to_string(), right(value, width)]
    }
}

/// Greedy word wrap. Words longer than `width` are hard-split.
fn wrap(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() > width {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            let rest = word.split_off(width);
            lines.push(word.into_iter().collect());
            word = rest;
        }
        let word: String = word.into_iter().collect();
        let needed = if current.is_empty() { 0 } else { current.chars().count() + 1 };
        if needed + word.chars().count() > width {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Map text onto code page 437, the default on ESC/POS thermal printers.
/// Characters with no CP437 glyph become `?`.
pub fn encode_cp437(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            '\u{00}'..='\u{7F}' => c as u8,
            'Ç' => 0x80,
            'ü' => 0x81,
            'é' => 0x82,
            'â' => 0x83,
            'ä' => 0x84,
            'à' => 0x85,
            'ç' => 0x87,
            'ê' => 0x88,
            'è' => 0x8A,
            'ï' => 0x8B,
            'î' => 0x8C,
            'Ä' => 0x8E,
            'É' => 0x90,
            'ô' => 0x93,
            'ö' => 0x94,
            'û' => 0x96,
            'ù' => 0x97,
            'Ö' => 0x99,
            'Ü' => 0x9A,
            '¢' => 0x9B,
            '£' => 0x9C,
            '¥' => 0x9D,
            'á' => 0xA0,
            'í' => 0xA1,
            'ó' => 0xA2,
            'ú' => 0xA3,
            'ñ' => 0xA4,
            'Ñ' => 0xA5,
            '°' => 0xF8,
            _ => b'?',
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 19, 5, 0).unwrap()
    }

    fn kot(payload: Value) -> PrintJob {
        PrintJob::new("1", JobKind::KitchenOrder, payload)
    }

    #[test]
    fn kitchen_ticket_layout() {
        let job = kot(json!({
            "restaurant": "Spice Route",
            "order_number": "A-1042",
            "table": 7,
            "items": [
                {"name": "Paneer Tikka", "quantity": 2},
                {"name": "Dal Makhani", "quantity": 1, "note": "less spicy"}
            ]
        }));
        let ticket = render(&job, 32, now()).unwrap();

        assert_eq!(ticket.title, "KOT-A-1042");
        let lines: Vec<&str> = ticket.text.lines().collect();
        assert_eq!(lines[0], "=".repeat(32));
        assert_eq!(lines[1].trim(), "KITCHEN ORDER TICKET (KOT)");
        assert!(ticket.text.contains("Order #: A-1042"));
        assert!(ticket.text.contains("Table: 7"));
        assert!(ticket.text.contains("Time: 14/03/2026 19:05"));
        assert!(ticket.text.contains("2x Paneer Tikka"));
        assert!(ticket.text.contains("   Note: less spicy"));
        assert!(ticket.text.contains("Total Items: 2"));
        assert!(ticket.text.contains("Total Qty: 3"));
        assert!(ticket.text.contains("NOT FOR BILLING"));
        assert!(lines.iter().all(|l| l.chars().count() <= 32));
    }

    #[test]
    fn bar_ticket_uses_bar_headings() {
        let job = PrintJob::new(
            "2",
            JobKind::BarOrder,
            json!({"items": [{"name": "Mojito", "qty": 3}]}),
        );
        let ticket = render(&job, 32, now()).unwrap();
        assert!(ticket.text.contains("BAR ORDER TICKET (BOT)"));
        assert!(ticket.text.contains("BAR ITEMS:"));
        assert!(ticket.text.contains("For bar preparation only"));
        assert_eq!(ticket.title, "BOT-2");
    }

    #[test]
    fn receipt_totals_align_right() {
        let job = PrintJob::new(
            "9",
            JobKind::Receipt,
            json!({
                "restaurant": "Spice Route",
                "receipt_number": 12,
                "order_number": "A-1042",
                "items": [
                    {"name": "Naan", "quantity": 2, "price": 1.5},
                    {"name": "Curry", "quantity": 1, "total": "8.00"}
                ],
                "tax": 0.55, "tax_rate": 0.05,
                "total": "11.55",
                "payment_method": "cash",
                "amount_paid": 20
            }),
        );
        let ticket = render(&job, 32, now()).unwrap();
        let lines: Vec<&str> = ticket.text.lines().collect();

        assert_eq!(lines[0].trim(), "SPICE ROUTE");
        assert!(
            lines
                .iter()
                .any(|l| l.trim_start() == "RECEIPT #000012" && l.chars().count() == 32)
        );
        let subtotal = lines.iter().find(|l| l.starts_with("Subtotal:")).unwrap();
        assert!(subtotal.ends_with("$11.00"));
        assert_eq!(subtotal.chars().count(), 32);
        assert!(ticket.text.contains("Tax (5.0%):"));
        let change = lines.iter().find(|l| l.starts_with("Change:")).unwrap();
        assert!(change.ends_with("$8.45"));
        assert!(ticket.text.contains("Method:"));
        assert!(ticket.text.contains("Cash"));
        assert!(ticket.text.contains("Thank you for dining with us!"));
    }

    #[test]
    fn receipt_without_total_is_render_error() {
        let job = PrintJob::new(
            "9",
            JobKind::Receipt,
            json!({"items": [{"name": "Naan", "quantity": 1}]}),
        );
        assert!(matches!(render(&job, 32, now()), Err(RelayError::Render(_))));
    }

    #[test]
    fn non_finite_total_is_render_error() {
        for total in ["NaN", "inf", "-Infinity"] {
            let job = PrintJob::new(
                "9",
                JobKind::Receipt,
                json!({"items": [{"name": "Naan", "quantity": 1}], "total": total}),
            );
            let err = render(&job, 32, now()).unwrap_err();
            assert!(matches!(err, RelayError::Render(ref m) if m.contains("total")), "{total}");
        }
    }

    #[test]
    fn missing_items_is_render_error() {
        let err = render(&kot(json!({"order_number": 5})), 32, now()).unwrap_err();
        assert!(matches!(err, RelayError::Render(ref m) if m.contains("items")));
    }

    #[test]
    fn empty_items_is_render_error() {
        let err = render(&kot(json!({"items": []})), 32, now()).unwrap_err();
        assert!(matches!(err, RelayError::Render(_)));
    }

    #[test]
    fn zero_quantity_is_render_error() {
        let err = render(&kot(json!({"items": [{"name": "Tea", "quantity": 0}]})), 32, now())
            .unwrap_err();
        assert!(matches!(err, RelayError::Render(ref m) if m.contains("Tea")));
    }

    #[test]
    fn non_object_payload_is_render_error() {
        let err = render(&kot(json!([1, 2, 3])), 32, now()).unwrap_err();
        assert!(matches!(err, RelayError::Render(_)));
    }

    #[test]
    fn unknown_kind_is_render_error() {
        let job = PrintJob::new("3", JobKind::Unrecognised("label".into()), json!({"items": []}));
        let err = render(&job, 32, now()).unwrap_err();
        assert!(matches!(err, RelayError::Render(ref m) if m.contains("label")));
    }

    #[test]
    fn prerendered_content_passes_through() {
        let job = kot(json!({"content": "2x Samosa\n1x Chai"}));
        let ticket = render(&job, 32, now()).unwrap();
        assert_eq!(ticket.text, "2x Samosa\n1x Chai");

        let job = kot(json!("plain text ticket"));
        assert_eq!(render(&job, 32, now()).unwrap().text, "plain text ticket");
    }

    #[test]
    fn blank_prerendered_content_is_render_error() {
        let job = kot(json!({"content": "   "}));
        assert!(matches!(render(&job, 32, now()), Err(RelayError::Render(_))));
    }

    #[test]
    fn escpos_frame() {
        let job = kot(json!("Crème brûlée ☕"));
        let bytes = render(&job, 32, now()).unwrap().escpos();
        assert_eq!(&bytes[..2], &[ESC, b'@']);
        assert_eq!(&bytes[bytes.len() - 4..], &[GS, b'V', 66, 0]);
        assert!(bytes.windows(3).any(|w| w == b"KOT"));
        // è exists in CP437, the cup does not.
        assert!(bytes.contains(&0x8A));
        assert!(bytes.contains(&b'?'));
    }

    #[test]
    fn wrap_respects_width() {
        let lines = wrap("   Note: please bring the sauce separately with extra onions", 20);
        assert!(lines.iter().all(|l| l.chars().count() <= 20));
        assert_eq!(lines.join(" "), "Note: please bring the sauce separately with extra onions");
    }

    #[test]
    fn two_col_overflow_splits_lines() {
        let lines = two_col("1x Extremely Long Dish Name Here", "$10.00", 32);
        assert_eq!(lines.len(), 2);
        assert!(lines[1].ends_with("$10.00"));
    }
}
