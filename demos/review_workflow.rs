use invoice_review::*;
use std::error::Error;

const SHEET: &str = "\
Debiteurnummer;Relatie;Factuurnummer;Factuurdatum;Betalingstermijn;Totaalbedrag
1042;Acme BV;F-2024-101;2024-01-05;30;1.250,50
7;Bakkerij de Zon;F-2024-102;2024-02-26;30;89,95
210;Groothandel Noord;F-2024-103;2024-02-01;14;410,00
";

fn main() -> std::result::Result<(), Box<dyn Error>> {
    let config = ReviewConfig::from_json_str(
        r#"{
            "notifications": {
                "uploader_email": "administratie@example.nl",
                "reviewer_email": "controller@example.nl"
            }
        }"#,
    )?;

    println!("📥 Ingesting debtor sheet...\n");
    let rows = parse_csv(SHEET.as_bytes(), config.csv_delimiter_byte())?;
    let mut service = ReviewService::new(
        config,
        InMemoryUploadStore::new(),
        Vec::<NotificationEvent>::new(),
    )?;
    let upload = service.create_upload("debiteuren.csv", rows)?;

    for (idx, row) in upload.rows().iter().enumerate() {
        let due = row
            .due_state(upload.created_at())
            .map(|state| state.label())
            .unwrap_or_else(|| "onbekend".to_string());
        println!("  Row {}: {:?} ({})", idx, row.outcome(), due);
    }

    println!("\n🔎 Reviewing upload {}...", upload.id());
    let mut session = service.open_review(upload.id())?;
    session.approve(1)?;
    session.reject(2, Some("Factuur niet gevonden in administratie"))?;
    session.set_overall_comments("Controle Q1\nAcme BV telefonisch benaderen");

    let summary = session.summary();
    println!(
        "  {} approved, {} rejected, {} pending",
        summary.approved, summary.rejected, summary.pending
    );
    service.submit_review(session)?;

    println!("\n📨 Notifications:");
    for event in service.notifier() {
        println!("  {:?} -> {}", event.action, event.recipient);
    }

    let table = service.export(upload.id())?;
    println!("\n{}", table.to_markdown("Review debiteuren.csv"));

    let csv = service.export_csv(upload.id())?;
    println!("📄 CSV export ({} bytes):\n{}", csv.len(), String::from_utf8(csv)?);

    service.mark_processed(upload.id())?;
    println!("✅ Upload {} processed", upload.id());

    Ok(())
}
