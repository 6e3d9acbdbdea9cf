use std::path::PathBuf;

use clap::{Parser, Subcommand};
use phu_core::commercial::{self, CircuitType};
use phu_core::template::template_schema;
use phu_core::{FormSession, SiteType, Store, TemplateRegistry};
use phu_submit::{HttpBackend, Settlement, Submitter};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "phu")]
#[command(about = "Provisioning forms for SRX and commercial circuits")]
struct Args {
    /// Settings directory (defaults to ~/.phu)
    #[arg(long, global = true)]
    home: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

/// Which form to fill and how.
#[derive(clap::Args)]
struct FormArgs {
    /// Template id, e.g. oh_srx
    #[arg(short, long)]
    template: String,

    /// single or dual
    #[arg(short, long)]
    site_type: Option<SiteType>,

    /// Number of service blocks per site
    #[arg(short = 'n', long)]
    services: Option<usize>,

    /// Field values in entry order, e.g. --set serviceVlan1=100
    #[arg(long = "set", value_name = "NAME=VALUE")]
    values: Vec<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Write default settings and create the templates directory
    Init,
    /// List available form templates
    Templates,
    /// Print the JSON schema for user templates
    Schema,
    /// Fill a form and print its state
    Render {
        #[command(flatten)]
        form: FormArgs,

        /// Print the full snapshot as JSON
        #[arg(long)]
        json: bool,
    },
    /// Fill a form and generate its document through the backend
    Submit {
        #[command(flatten)]
        form: FormArgs,
    },
    /// Ask the backend for the next free pseudowire ID
    PwId {
        #[arg(long)]
        router_a: String,
        #[arg(long)]
        router_z: String,
    },
    /// Check that a VPN ID is unused
    VerifyVpn { vpn_id: String },
    /// Generated fields for a commercial circuit
    Describe {
        /// internet, transparent_lan or vpls
        #[arg(long)]
        circuit: CircuitType,
        #[arg(long)]
        customer: String,
        /// Bandwidth in Mbps
        #[arg(long)]
        bandwidth: String,
        #[arg(long)]
        circuit_id: String,
    },
    /// Port options for a Raisecom model
    Raisecom { model: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("phu_cli=info,phu_core=info,phu_submit=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let store = args.home.map(Store::new).unwrap_or_else(Store::open_default);

    match args.command {
        Command::Init => init(&store)?,
        Command::Templates => {
            let registry = TemplateRegistry::load(&store)?;
            for id in registry.ids() {
                let template = registry.require(id)?;
                println!("{:<12} {}", id, template.title);
            }
        }
        Command::Schema => println!("{}", serde_json::to_string_pretty(&template_schema())?),
        Command::Render { form, json } => {
            let session = fill(&store, &form)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&session.snapshot())?);
            } else {
                print_form(&session);
            }
        }
        Command::Submit { form } => {
            let session = fill(&store, &form)?;
            let settings = store.read_settings();
            let submitter = Submitter::new(HttpBackend::new(&settings.backend_url));
            let settled = submitter
                .generate_decom(&session, &settings.resolved_download_dir())
                .await?;
            report(&submitter, &settled).await;
        }
        Command::PwId { router_a, router_z } => {
            let submitter = submitter(&store);
            let settled = submitter.fetch_pw_id(&router_a, &router_z).await;
            report(&submitter, &settled).await;
        }
        Command::VerifyVpn { vpn_id } => {
            let submitter = submitter(&store);
            let settled = submitter.verify_vpn_id(&vpn_id).await;
            report(&submitter, &settled).await;
        }
        Command::Describe {
            circuit,
            customer,
            bandwidth,
            circuit_id,
        } => {
            println!(
                "description: {}",
                commercial::interface_description(circuit, &customer, &bandwidth, &circuit_id)
            );
            println!("l2 name:     {}", commercial::l2_name(&customer, &circuit_id));
            if circuit == CircuitType::Internet {
                println!("bgp password: {}", commercial::bgp_password(&customer, &circuit_id));
            }
        }
        Command::Raisecom { model } => {
            let catalog = store.read_catalog()?;
            match commercial::raisecom_ports(&catalog, &model) {
                Some(ports) => {
                    println!("uplink: {}", ports.uplink_ports.join(", "));
                    println!("client: {}", ports.client_ports.join(", "));
                    let speeds = commercial::port_speeds(&[], ports.ten_gig);
                    if !speeds.is_empty() {
                        println!("extra speeds: {}", speeds.join(", "));
                    }
                }
                None => {
                    eprintln!("Unknown Raisecom model: {model}");
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}

fn init(store: &Store) -> Result<(), Box<dyn std::error::Error>> {
    if store.has_settings() {
        eprintln!("Settings already exist in {}", store.root().display());
    } else {
        store.write_settings(&Default::default())?;
        eprintln!("Wrote default settings to {}", store.root().display());
    }
    std::fs::create_dir_all(store.templates_dir())?;
    Ok(())
}

fn submitter(store: &Store) -> Submitter<HttpBackend> {
    Submitter::new(HttpBackend::new(store.read_settings().backend_url))
}

/// Load the template, generate it and apply `--set` values in order.
fn fill(store: &Store, form: &FormArgs) -> Result<FormSession, Box<dyn std::error::Error>> {
    let registry = TemplateRegistry::load(store)?;
    let template = registry.require(&form.template)?.clone();
    let mut session = FormSession::new(template, store.read_catalog()?);
    session.generate(form.site_type, form.services)?;

    for pair in &form.values {
        let (name, value) = pair
            .split_once('=')
            .ok_or_else(|| format!("expected NAME=VALUE, got '{pair}'"))?;
        let field = session
            .resolve(name)
            .ok_or_else(|| format!("no field named '{name}' in this form"))?;
        let outcome = session.set_value(&field, value)?;
        for dropped in &outcome.rejected {
            eprintln!(
                "{} not set to {}: port already in use",
                dropped.field, dropped.value
            );
        }
    }
    tracing::debug!(template = %form.template, values = form.values.len(), "form filled");
    Ok(session)
}

fn print_form(session: &FormSession) {
    let snapshot = session.snapshot();
    let print_field = |f: &phu_core::session::FieldSnapshot| {
        if !f.visible {
            return;
        }
        let marker = if f.required && f.value.is_empty() { "*" } else { " " };
        match &f.error {
            Some(error) => println!("{marker} {:<24} {:<20} <- {error}", f.name, f.value),
            None => println!("{marker} {:<24} {}", f.name, f.value),
        }
    };

    println!("{}", session.template().title);
    snapshot.fields.iter().for_each(print_field);
    for (site, blocks) in &snapshot.blocks {
        for block in blocks {
            println!("\n[{} {}]", site.label(), block.header);
            block.fields.iter().for_each(print_field);
        }
    }
    let progress = snapshot.progress;
    println!(
        "\n{}/{} required fields ({}%)",
        progress.filled, progress.total, progress.percent
    );
}

async fn report<T>(submitter: &Submitter<impl phu_submit::Backend>, settled: &Settlement<T>) {
    if let Some(notice) = submitter.status().await.notice() {
        if notice.is_success() {
            println!("{}", notice.message());
        } else {
            eprintln!("{}", notice.message());
        }
    }
    if matches!(settled, Settlement::Failed) {
        std::process::exit(1);
    }
}
