use crate::server::{build_relay, load_config, production_warnings};
use pipstream_core::ComponentStatus;
use tokio_util::sync::CancellationToken;

pub async fn run() -> anyhow::Result<()> {
    println!("🏥 pipstream doctor\n");

    print!("Loading configuration... ");
    let config = match load_config() {
        Ok(config) => {
            println!("✅");
            config
        }
        Err(e) => {
            println!("❌ {:#}", e);
            std::process::exit(1);
        }
    };

    for warning in production_warnings(&config) {
        println!("  ⚠️  {}", warning);
    }

    let relay = build_relay(&config, CancellationToken::new())?;
    let health = relay.health().await;

    let mut all_ok = true;
    all_ok &= report(&format!("Event log ({})", health.log_backend), health.log);
    all_ok &= report("Workflow engine", health.workflow_engine);

    println!();
    if all_ok {
        println!("✅ All checks passed! Ready to relay.");
    } else {
        println!("⚠️  Some checks failed. Please fix the issues above.");
        std::process::exit(1);
    }

    Ok(())
}

fn report(name: &str, status: ComponentStatus) -> bool {
    match status {
        ComponentStatus::Healthy => {
            println!("Checking {}... ✅ reachable", name);
            true
        }
        ComponentStatus::Disabled => {
            println!("Checking {}... ⏭️  disabled", name);
            true
        }
        ComponentStatus::Disconnected => {
            println!("Checking {}... ❌ unreachable", name);
            false
        }
    }
}
