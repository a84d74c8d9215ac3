//! CLI smoke and maintenance entry point.
//!
//! # Responsibility
//! - Verify `teamhub_core` linkage with deterministic output.
//! - Print the pack/module table.
//! - Run the one-shot legacy membership import against a database file.

use std::process::ExitCode;
use teamhub_core::{
    CoreConfig, LegacyImporter, Pack, SqliteMembershipRepository, SqliteTeamRepository,
};

const USAGE: &str = "usage: teamhub_cli [ping | packs | import-legacy <db-path> <export.json>]";

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let result = match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        [] | ["ping"] => {
            smoke();
            Ok(())
        }
        ["packs"] => {
            print_packs();
            Ok(())
        }
        ["import-legacy", db_path, export_path] => import_legacy(db_path, export_path),
        _ => Err(USAGE.to_string()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{message}");
            ExitCode::FAILURE
        }
    }
}

fn smoke() {
    println!("teamhub_core ping={}", teamhub_core::ping());
    println!("teamhub_core version={}", teamhub_core::core_version());
}

fn print_packs() {
    for pack in Pack::all() {
        let modules: Vec<&str> = pack.modules().iter().map(|module| module.as_str()).collect();
        println!("{:<10} {:<12} {}", pack.as_str(), pack.label(), modules.join(","));
    }
}

fn import_legacy(db_path: &str, export_path: &str) -> Result<(), String> {
    let json = std::fs::read_to_string(export_path)
        .map_err(|err| format!("cannot read `{export_path}`: {err}"))?;
    let conn = CoreConfig::new()
        .with_db_path(db_path)
        .open_database()
        .map_err(|err| err.to_string())?;

    let feed = teamhub_core::ChangeFeed::new();
    let importer = LegacyImporter::new(
        SqliteMembershipRepository::new(&conn, feed),
        SqliteTeamRepository::new(&conn),
    );
    let report = importer.import_json(&json).map_err(|err| err.to_string())?;

    println!(
        "teams created={} existing={}",
        report.teams_created, report.teams_existing
    );
    println!(
        "memberships created={} existing={}",
        report.memberships_created, report.memberships_existing
    );
    println!("active teams seeded={}", report.active_teams_seeded);
    println!(
        "skipped invalid={} dangling={}",
        report.skipped_invalid, report.skipped_dangling
    );
    Ok(())
}
