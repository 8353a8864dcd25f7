use std::path::PathBuf;
use std::time::Duration;
use tabcast_browser::DebugSession;
use tabcast_core::Paths;

/// Run environment diagnostics: config, broker reachability, debugger
/// endpoint.
pub async fn run(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    println!();
    println!("🩺 tabcast doctor — Environment Diagnostics");
    println!("================================");
    println!();

    let mut ok_count = 0u32;
    let mut warn_count = 0u32;
    let mut err_count = 0u32;

    // --- 1. Config ---
    println!("📋 Configuration");
    let paths = Paths::new();
    let effective_path = config_path.clone().unwrap_or_else(|| paths.config_file());
    if effective_path.exists() {
        print_ok("Config file exists", &effective_path.display().to_string());
        ok_count += 1;
    } else {
        print_warn("Config file not found", "Running on built-in defaults");
        warn_count += 1;
    }

    let config = match super::load_config(config_path) {
        Ok(c) => {
            print_ok("Config parsed", "");
            ok_count += 1;
            c
        }
        Err(e) => {
            print_err("Config invalid", &e.to_string());
            err_count += 1;
            println!();
            print_summary(ok_count, warn_count, err_count);
            return Ok(());
        }
    };
    println!("  Instance: {}", config.instance);
    println!("  Topic prefix: {}", config.topic_prefix);
    println!();

    // --- 2. Broker ---
    println!("📡 Broker");
    let addr = format!("{}:{}", config.broker.host, config.broker.port);
    match tokio::time::timeout(
        Duration::from_secs(5),
        tokio::net::TcpStream::connect(&addr),
    )
    .await
    {
        Ok(Ok(_)) => {
            print_ok("Broker reachable", &addr);
            ok_count += 1;
        }
        Ok(Err(e)) => {
            print_err("Broker not reachable", &format!("{}: {}", addr, e));
            err_count += 1;
        }
        Err(_) => {
            print_err("Broker not reachable", &format!("{}: connect timed out", addr));
            err_count += 1;
        }
    }
    if config.credentials().is_some() {
        print_ok("Broker credentials configured", "");
        ok_count += 1;
    } else {
        print_warn("No broker credentials", "Fine for anonymous brokers");
        warn_count += 1;
    }
    println!();

    // --- 3. Browser debugger ---
    println!("🖥️  Browser debugger");
    let session = DebugSession::new(config.debugger_port);
    match session.targets().await {
        Ok(targets) => {
            print_ok(
                &format!("{} debug target(s) exposed", targets.len()),
                &format!("port {}", config.debugger_port),
            );
            ok_count += 1;
        }
        Err(e) => {
            print_err(
                "Debugger not reachable",
                &format!(
                    "{} — start the browser with --remote-debugging-port={}",
                    e, config.debugger_port
                ),
            );
            err_count += 1;
        }
    }
    println!();

    print_summary(ok_count, warn_count, err_count);
    Ok(())
}

fn print_ok(label: &str, detail: &str) {
    if detail.is_empty() {
        println!("  ✅ {}", label);
    } else {
        println!("  ✅ {} — {}", label, detail);
    }
}

fn print_warn(label: &str, hint: &str) {
    if hint.is_empty() {
        println!("  ⚠️  {}", label);
    } else {
        println!("  ⚠️  {} — {}", label, hint);
    }
}

fn print_err(label: &str, hint: &str) {
    if hint.is_empty() {
        println!("  ❌ {}", label);
    } else {
        println!("  ❌ {} — {}", label, hint);
    }
}

fn print_summary(ok_count: u32, warn_count: u32, err_count: u32) {
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!(
        "  ✅ {} passed  ⚠️  {} warnings  ❌ {} errors",
        ok_count, warn_count, err_count
    );

    if err_count > 0 {
        println!();
        println!("  {} error(s) must be fixed before normal use.", err_count);
    } else if warn_count > 0 {
        println!();
        println!("  Core features OK. Some optional features not ready.");
    } else {
        println!();
        println!("  🎉 All good!");
    }
    println!();
}
