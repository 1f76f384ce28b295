//! Uniswap v4 CREATE2 salt miner CLI
//!
//! Searches wallet-bound salts until the derived address reaches the target
//! score, printing every improvement as it is found.

use std::process;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use clap::Parser;
use crossbeam_channel::RecvTimeoutError;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use uni_vanity::worker::SessionOutcome;
use uni_vanity::{Candidate, Config, Coordinator, Session, SessionError, SessionEvent};

fn main() {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::parse();

    if let Err(e) = config.validate() {
        eprintln!("Configuration error: {}", e);
        process::exit(1);
    }

    let (primitive, scorer, session_config) =
        match (config.primitive(), config.scorer(), config.session_config()) {
            (Ok(p), Ok(s), Ok(c)) => (p, s, c),
            (Err(e), _, _) | (_, Err(e), _) | (_, _, Err(e)) => {
                eprintln!("Configuration error: {}", e);
                process::exit(1);
            }
        };

    println!("Uniswap v4 Salt Miner");
    println!("=====================");
    println!("Wallet:       0x{}", hex::encode(session_config.wallet.as_bytes()));
    println!("Deployer:     0x{}", hex::encode(primitive.deployer()));
    println!("Scorer:       {}", config.scorer);
    if let Some(pattern) = config.build_pattern() {
        let pattern_display = match pattern.suffix() {
            Some(suffix) => format!("{} ... {} ({})", pattern.pattern(), suffix, pattern.pattern_type()),
            None => format!("{} ({})", pattern.pattern(), pattern.pattern_type()),
        };
        println!("Pattern:      {}", pattern_display);
        if pattern.is_case_sensitive() {
            println!("Matching:     case-sensitive (EIP-55 checksum)");
        }
        println!("Difficulty:   {}", pattern.difficulty_description());
    }
    println!("Target score: {}", config.target_score);
    if let Some(floor) = config.floor {
        println!("Floor:        {}", floor);
    }
    println!("Workers:      {}", config.worker_count());
    println!("Batch size:   {}", format_number(config.batch_size));
    println!("Salts:        {}", config.salts);
    println!();

    let coordinator = Coordinator::new(Arc::new(primitive), scorer, config.salts);
    let session = match coordinator.start_session(session_config) {
        Ok(session) => session,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    let cancel = session.cancel_handle();
    ctrlc::set_handler(move || {
        cancel.store(true, Ordering::Relaxed);
    })
    .expect("set Ctrl-C handler");

    println!("Searching... (Press Ctrl+C to stop)\n");

    let report_interval = config.report_interval();
    loop {
        match session.events().recv_timeout(report_interval) {
            Ok(SessionEvent::Progress { best, attempts }) => print_progress(&best, attempts),
            Ok(SessionEvent::Error {
                unit,
                reason,
                continuing,
            }) => {
                eprintln!("Search unit {} failed: {}", unit, reason);
                if !continuing {
                    break;
                }
            }
            Ok(SessionEvent::InitFailed { unit, reason }) => {
                eprintln!("Search unit {} failed to load: {}", unit, reason);
            }
            Ok(SessionEvent::Done { reason, .. }) => {
                println!("\nStopped: {}.", reason);
                break;
            }
            Ok(SessionEvent::Ready { .. }) | Ok(SessionEvent::NotReady { .. }) => {}
            Err(RecvTimeoutError::Timeout) => print_rate(&session),
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    let elapsed = session.elapsed();
    let rate = session.attempts_per_second();
    let batches = session.stats().total_batches();
    let improvements = session.stats().total_improvements();

    let (best, attempts, failed) = match session.wait() {
        Ok(SessionOutcome { best, attempts, .. }) => (best, attempts, false),
        Err(SessionError::AllUnitsFailed { best, attempts, .. }) => {
            eprintln!("\nError: every search unit failed");
            (best, attempts, true)
        }
        Err(e) => {
            eprintln!("\nError: {}", e);
            process::exit(1);
        }
    };

    match best {
        Some(candidate) => print_result(&candidate),
        None => println!("\nNo candidate found."),
    }

    println!("\n--- Final Statistics ---");
    println!("Total salts tried:  {}", format_number(attempts));
    println!("Batches:            {}", batches);
    println!("Improvements:       {}", improvements);
    println!("Time elapsed:       {:.2}s", elapsed.as_secs_f64());
    println!("Average speed:      {}/s", format_number(rate as u64));

    if failed {
        process::exit(1);
    }
}

fn print_result(candidate: &Candidate) {
    println!("\n=== Best Salt ===");
    println!("Address:      {}", candidate.address.to_checksum());
    println!("Salt (hex):   {}", candidate.salt.to_hex_prefixed());
    println!("Salt (dec):   {}", candidate.salt.to_decimal());
    println!("Score:        {}", candidate.score);
}

fn print_progress(best: &Candidate, attempts: u64) {
    println!(
        "New best: score {} at {} (after {} salts)",
        best.score,
        best.address.to_checksum(),
        format_number(attempts)
    );
}

fn print_rate(session: &Session) {
    println!(
        "[{:>4}s] Tried {} salts ({}/s)",
        session.elapsed().as_secs(),
        format_number(session.stats().total_attempts()),
        format_number(session.attempts_per_second() as u64)
    );
}

fn format_number(n: u64) -> String {
    if n >= 1_000_000_000 {
        format!("{:.2}B", n as f64 / 1e9)
    } else if n >= 1_000_000 {
        format!("{:.2}M", n as f64 / 1e6)
    } else if n >= 1_000 {
        format!("{:.2}K", n as f64 / 1e3)
    } else {
        n.to_string()
    }
}
