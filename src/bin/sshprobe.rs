//! SSH probe CLI
//!
//! Throws credentials at an SSH server and prints the verdicts. Handy for
//! checking a running decoy from the outside.
//!
//! Usage:
//!   cargo run --bin sshprobe --features testing -- --addr localhost:22 --password hunter2
//!   cargo run --bin sshprobe --features testing -- --user root --publickey --kbd letmein

use anyhow::Result;
use sshsnare::testing::{ProbeResult, SshProbe};

#[derive(Default)]
struct Args {
    addr: String,
    username: String,
    passwords: Vec<String>,
    kbd_answers: Vec<String>,
    publickey: bool,
}

fn parse_args() -> Result<Args> {
    let mut args = Args {
        addr: "localhost:22".to_string(),
        username: whoami::username(),
        ..Default::default()
    };

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--addr" | "-a" => {
                args.addr = iter.next().ok_or_else(|| anyhow::anyhow!("--addr requires value"))?;
            }
            "--user" | "-u" => {
                args.username = iter.next().ok_or_else(|| anyhow::anyhow!("--user requires value"))?;
            }
            "--password" | "-p" => {
                args.passwords.push(iter.next().ok_or_else(|| anyhow::anyhow!("--password requires value"))?);
            }
            "--kbd" | "-k" => {
                args.kbd_answers.push(iter.next().ok_or_else(|| anyhow::anyhow!("--kbd requires value"))?);
            }
            "--publickey" | "-K" => {
                args.publickey = true;
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            other => {
                eprintln!("unknown argument: {}", other);
                print_help();
                std::process::exit(1);
            }
        }
    }

    Ok(args)
}

fn print_help() {
    eprintln!(
        r#"sshprobe - SSH authentication probe

USAGE:
    sshprobe [OPTIONS]

OPTIONS:
    -a, --addr <ADDR>        Server address [default: localhost:22]
    -u, --user <NAME>        Username [default: current user]
    -p, --password <PASS>    Password to try (can be repeated)
    -k, --kbd <ANSWER>       Keyboard-interactive answer to try (can be repeated)
    -K, --publickey          Try a throwaway Ed25519 key
    -h, --help               Print help

EXAMPLES:
    sshprobe --password hunter2
    sshprobe --user root --publickey --kbd letmein
    sshprobe --addr 192.168.1.10:22 --user admin --password admin
"#
    );
}

/// Print one verdict. Returns false once the server has hung up, which
/// the decoy does after the first rejection by default.
fn report(label: &str, result: Result<ProbeResult>) -> bool {
    match result {
        Ok(verdict) => {
            println!("{}: {:?}", label, verdict);
            true
        }
        Err(e) => {
            println!("{}: connection closed ({:#})", label, e);
            false
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args()?;

    if args.passwords.is_empty() && args.kbd_answers.is_empty() && !args.publickey {
        eprintln!("error: nothing to try; pass --password, --kbd or --publickey");
        print_help();
        std::process::exit(1);
    }

    eprintln!("connecting to {} as {}...", args.addr, args.username);
    let mut probe = SshProbe::connect(&args.addr).await?;
    eprintln!(
        "key exchange done, host key {}",
        probe.host_key_algorithm().unwrap_or_else(|| "unknown".to_string())
    );

    for password in &args.passwords {
        let result = probe.password(&args.username, password).await;
        if !report(&format!("password {:?}", password), result) {
            return Ok(());
        }
    }
    for answer in &args.kbd_answers {
        let result = probe.keyboard_interactive(&args.username, answer).await;
        if !report(&format!("keyboard-interactive {:?}", answer), result) {
            return Ok(());
        }
    }
    if args.publickey {
        let result = probe.publickey(&args.username).await;
        if !report("publickey", result) {
            return Ok(());
        }
    }

    probe.close().await?;
    eprintln!("disconnected");

    Ok(())
}
