//! ws-transport diagnostic CLI.
//!
//! ```text
//! probe   → ConnectionFactory::connect_as_client → write_handshake → read_handshake_lines
//! inspect → TcpListener::accept → ConnectionFactory::accept_as_server
//!         → read_handshake_lines → write_handshake → close
//! ```

use std::net::TcpListener;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use ws_transport::config::loader::load_config;
use ws_transport::observability::logging;
use ws_transport::{ConnectionFactory, HandshakeLines, TransportConfig};

#[derive(Parser)]
#[command(name = "ws-transport")]
#[command(about = "Open WebSocket-style transport connections and inspect handshakes", long_about = None)]
struct Cli {
    /// Transport configuration file (TOML).
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a GET handshake and print the response header block
    Probe {
        host: String,
        port: u16,

        /// Request target
        #[arg(long, default_value = "/")]
        path: String,

        /// Extra header line, e.g. "Upgrade: websocket"
        #[arg(long = "header")]
        headers: Vec<String>,
    },
    /// Accept one connection, print its handshake and reply
    Inspect {
        #[arg(short, long, default_value = "127.0.0.1:9001")]
        bind: String,

        /// Status line sent back to the peer
        #[arg(long, default_value = "HTTP/1.1 101 Switching Protocols")]
        status: String,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => TransportConfig::default(),
    };
    logging::init(&config.observability);

    tracing::info!(
        mode = ?config.security.mode,
        max_header_bytes = config.handshake.max_header_bytes,
        "Configuration loaded"
    );

    let factory = ConnectionFactory::new(config);

    match cli.command {
        Commands::Probe {
            host,
            port,
            path,
            headers,
        } => {
            let connection = factory.connect_as_client(&host, port)?;

            let mut request = HandshakeLines::new(format!("GET {} HTTP/1.1", path))
                .header("Host", &format!("{}:{}", host, port));
            for line in headers {
                request = request.line(line);
            }
            connection.write_handshake(&request)?;

            for line in connection.read_handshake_lines()? {
                println!("{}", line);
            }
            connection.close()?;
        }
        Commands::Inspect { bind, status } => {
            let listener = TcpListener::bind(&bind)?;
            tracing::info!(address = %listener.local_addr()?, "Waiting for one connection");

            let (stream, peer) = listener.accept()?;
            let connection = factory.accept_as_server(stream)?;
            println!("# {} ({})", peer, connection.security_mode());
            for line in connection.read_handshake_lines()? {
                println!("{}", line);
            }

            connection.write_handshake(&HandshakeLines::new(status))?;
            connection.close()?;
        }
    }

    Ok(())
}
