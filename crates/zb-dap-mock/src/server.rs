use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::PathBuf;

use dap::prelude::*;
use tracing::{debug, info};

use crate::adapter::{Flow, MockAdapter};
use crate::error::Result;
use crate::program::Program;

/// Serves DAP on stdin/stdout until the client disconnects or closes the stream.
pub fn start(program: Program) -> Result<()> {
    info!(program = %program.name, "Starting mock debug adapter");

    let source_root = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let mut adapter = MockAdapter::new(program, source_root);
    let mut server = Server::new(BufReader::new(io::stdin()), BufWriter::new(io::stdout()));
    serve(&mut adapter, &mut server)
}

pub fn serve<R: Read, W: Write>(adapter: &mut MockAdapter, server: &mut Server<R, W>) -> Result<()> {
    while let Some(req) = server.poll_request()? {
        debug!(seq = req.seq, "Received request");
        if adapter.handle_request(req, server)? == Flow::Shutdown {
            info!("Client disconnected");
            return Ok(());
        }
    }
    info!("Client closed the stream");
    Ok(())
}

/// Reads and discards requests without ever answering.
pub fn swallow() -> Result<()> {
    let mut server = Server::new(BufReader::new(io::stdin()), BufWriter::new(io::sink()));
    while let Some(req) = server.poll_request()? {
        debug!(seq = req.seq, command = ?req.command, "Dropping request");
    }
    Ok(())
}
