use anyhow::Result;
use bidforge::pdf::render::CommandRenderer;
use bidforge::{BackendClient, Config, PdfMaterializer, ProposalSession, RecordStore, StaticTokenProvider};
use log::{error, info};
use std::env;
use std::path::Path;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init();

    let config = Config::from_env();
    let store = Arc::new(RecordStore::open(&config.data_dir, config.recent_limit)?);
    let session = Arc::new(ProposalSession::with_poll_interval(config.poll_interval));
    let auth = Arc::new(StaticTokenProvider::new(
        env::var("BIDFORGE_ID_TOKEN").unwrap_or_default(),
        env::var("BIDFORGE_USER_EMAIL").ok(),
    ));
    let backend = Arc::new(BackendClient::new(
        &config.base_url,
        auth,
        Arc::clone(&store),
        Arc::clone(&session),
    )?);
    let pdf = PdfMaterializer::new(
        Arc::clone(&store),
        Arc::new(CommandRenderer::new(&config.renderer_cmd)),
        config.pdf_dir.clone(),
    );

    let args: Vec<String> = env::args().skip(1).collect();
    match (args.first().map(String::as_str), args.get(1)) {
        (Some("recent"), None) => {
            for rec in store.recent(config.recent_limit)? {
                let flags = format!(
                    "{}{}{}",
                    if rec.srs_json.is_some() { "S" } else { "-" },
                    if rec.proposal_json.is_some() { "P" } else { "-" },
                    if rec.pdf_path.is_some() { "D" } else { "-" },
                );
                println!("{}  {}  {}", rec.ts, flags, rec.filename);
            }
        }
        (Some("upload"), Some(path)) => {
            info!("uploading SRS document {path}");
            match backend.upload_srs_file(Path::new(path)).await {
                Some(body) => println!("{body}"),
                None => error!("upload failed"),
            }
        }
        (Some("propose"), Some(filename)) => {
            info!("requesting proposal for {filename}");
            session.set_waiting(filename);
            let generator = Arc::clone(&backend);
            let target = filename.clone();
            let generation =
                tokio::spawn(async move { generator.generate_proposal_for_file(&target).await });

            let ready = tokio::select! {
                ready = session.await_ready(&store) => ready,
                outcome = generation => match outcome {
                    Ok(Some(_)) => session.await_ready(&store).await,
                    _ => {
                        session.clear_waiting();
                        None
                    }
                },
            };
            match ready {
                Some(ready) => {
                    info!("proposal ready for {}", ready.filename);
                    println!("feasible: {:?}", ready.feasibility.feasible);
                    for reason in &ready.feasibility.reasons {
                        println!("  - {reason}");
                    }
                    println!(
                        "report html: {}",
                        if ready.report_html.is_some() { "yes" } else { "no" }
                    );
                }
                None => error!("no proposal was produced for {filename}"),
            }
        }
        (Some("pdf"), Some(filename)) => match pdf.ensure_pdf(filename, None).await {
            Some(path) => println!("{}", path.display()),
            None => error!("no PDF could be produced for {filename}"),
        },
        (Some("show"), Some(filename)) => match store.get_proposal_for_file(filename)? {
            Some(json) => {
                let feasibility = bidforge::proposal::extract_feasibility_str(&json);
                if let Some(feasible) = feasibility.feasible {
                    info!("feasible: {feasible}");
                }
                println!("{json}");
            }
            None => error!("no proposal stored for {filename}"),
        },
        (Some("profile"), None) => match backend.get_profile().await {
            Some(body) => println!("{body}"),
            None => error!("profile fetch failed"),
        },
        _ => {
            eprintln!("usage: bidforge <recent | upload FILE | propose FILENAME | pdf FILENAME | show FILENAME | profile>");
        }
    }
    Ok(())
}
