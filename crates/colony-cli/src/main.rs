use std::env;
use std::net::SocketAddr;

use colony_api::{serve, EngineApi};
use contracts::RunConfig;

fn print_usage() {
    println!("colony-cli <command>");
    println!("commands:");
    println!("  status");
    println!("  step [n]");
    println!("  run-to <tick>");
    println!("  serve [addr]");
    println!("    default addr: 127.0.0.1:8080");
    println!("  simulate <run_id> <seed> [ticks] [sqlite_path]");
    println!("    runs a deterministic colony to the target tick and persists to sqlite");
}

fn parse_u64(value: Option<&String>, label: &str) -> Result<u64, String> {
    let raw = value.ok_or_else(|| format!("missing {label}"))?;
    raw.parse::<u64>()
        .map_err(|_| format!("invalid {label}: {raw}"))
}

fn parse_socket_addr(value: Option<&String>) -> Result<SocketAddr, String> {
    let raw = value.map(String::as_str).unwrap_or("127.0.0.1:8080");
    raw.parse::<SocketAddr>()
        .map_err(|_| format!("invalid addr: {raw}"))
}

fn default_sqlite_path() -> String {
    std::env::var("COLONY_SQLITE_PATH")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| "colony_runs.sqlite".to_string())
}

fn run_simulation(args: &[String]) -> Result<(), String> {
    let run_id = args
        .get(2)
        .cloned()
        .ok_or_else(|| "missing run_id".to_string())?;
    let seed = parse_u64(args.get(3), "seed")?;
    let target_tick = args
        .get(4)
        .map(|value| {
            value
                .parse::<u64>()
                .map_err(|_| format!("invalid ticks: {value}"))
        })
        .transpose()?
        .unwrap_or(720);
    let sqlite_path = args
        .get(5)
        .map(String::to_string)
        .filter(|path| !path.trim().is_empty())
        .unwrap_or_else(default_sqlite_path);

    let config = RunConfig {
        run_id: run_id.clone(),
        seed,
        max_ticks: target_tick.max(1),
        ..RunConfig::default()
    };

    let mut api = EngineApi::from_config(config);
    api.attach_sqlite_store(&sqlite_path)
        .map_err(|err| format!("failed to attach sqlite store: {err}"))?;
    api.initialize_run_storage(true)
        .map_err(|err| format!("failed to initialize run storage: {err}"))?;
    api.start();
    let (status, committed) = api
        .run_to_tick(target_tick)
        .map_err(|fault| format!("fatal tick fault at tick {}: {fault}", api.status().current_tick))?;
    api.pause();

    if let Some(error) = api.last_persistence_error() {
        return Err(format!("persistence error after simulation: {error}"));
    }

    println!(
        "simulated run_id={} seed={} committed={} tick={}/{} agents={} sqlite={}",
        run_id, seed, committed, status.current_tick, status.max_ticks, status.agent_count,
        sqlite_path
    );
    Ok(())
}

#[tokio::main]
async fn main() {
    let args: Vec<String> = env::args().collect();
    let command = args.get(1).map(String::as_str);

    let mut api = EngineApi::from_config(RunConfig::default());

    match command {
        Some("status") => {
            println!("{}", api.status());
        }
        Some("step") => {
            let ticks = args.get(2).and_then(|v| v.parse::<u64>().ok()).unwrap_or(1);
            match api.step(ticks) {
                Ok((status, committed)) => println!("stepped={committed} {status}"),
                Err(fault) => {
                    eprintln!("fatal: {fault}");
                    std::process::exit(1);
                }
            }
        }
        Some("run-to") => match parse_u64(args.get(2), "tick") {
            Ok(target_tick) => match api.run_to_tick(target_tick) {
                Ok((status, committed)) => println!("committed={committed} {status}"),
                Err(fault) => {
                    eprintln!("fatal: {fault}");
                    std::process::exit(1);
                }
            },
            Err(err) => {
                eprintln!("error: {err}");
                print_usage();
                std::process::exit(2);
            }
        },
        Some("serve") => match parse_socket_addr(args.get(2)) {
            Ok(addr) => {
                println!("serving api on http://{addr}");
                if let Err(err) = serve(addr).await {
                    eprintln!("server error: {err}");
                    std::process::exit(1);
                }
            }
            Err(err) => {
                eprintln!("error: {err}");
                print_usage();
                std::process::exit(2);
            }
        },
        Some("simulate") => {
            if let Err(err) = run_simulation(&args) {
                eprintln!("error: {err}");
                print_usage();
                std::process::exit(2);
            }
        }
        _ => {
            print_usage();
        }
    }
}
