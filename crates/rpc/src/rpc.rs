use jsonrpsee::{
    server::{Server, ServerHandle},
    Methods,
};

/// Thin wrapper around the `jsonrpsee` server, collecting the RPC namespaces
/// before startup
pub struct JsonRpcServer {
    /// The address to listen on
    listen_address: String,
    /// The RPC methods to be exposed
    methods: Methods,
}

impl JsonRpcServer {
    pub fn new(listen_address: String) -> Self {
        Self { listen_address, methods: Methods::new() }
    }

    /// Add a namespace's methods to the server
    pub fn add_methods(&mut self, methods: impl Into<Methods>) -> eyre::Result<()> {
        self.methods.merge(methods).map_err(Into::into)
    }

    /// Start the server; the returned [handle](ServerHandle) stops it when dropped
    pub async fn start(&self) -> eyre::Result<ServerHandle> {
        let server = Server::builder().build(&self.listen_address).await?;
        Ok(server.start(self.methods.clone()))
    }
}
