use std::net::SocketAddr;

use tokio::{io::BufReader, net::TcpStream};

use crate::{
    bet::Bet,
    protocol::{
        framing::{self, FramingError},
        message::{self, Batch},
    },
};

#[derive(thiserror::Error, Debug)]
pub enum AgencyErr {
    #[error("{0}")]
    Io(#[from] tokio::io::Error),

    #[error("{0}")]
    Framing(#[from] FramingError),

    #[error("unexpected response: {0:?}")]
    UnexpectedResponse(String),
}

/// The agency side of the protocol
///
/// every exchange runs over its own connection: one request, one response.
#[derive(Debug, Clone)]
pub struct AgencyClient {
    id: u32,
    server: SocketAddr,
}

impl AgencyClient {
    pub fn new(id: u32, server: SocketAddr) -> Self {
        Self { id, server }
    }

    /// Submits a batch of bets
    ///
    /// returns the number of bets the server has stored.
    pub async fn submit_bets(&self, bets: &[Bet]) -> Result<usize, AgencyErr> {
        let response = self.exchange(&Batch::render(bets)).await?;
        message::parse_stored(&response).ok_or(AgencyErr::UnexpectedResponse(response))
    }

    /// Asks for the winners of this agency
    ///
    /// returns None while the draw has not taken place.
    pub async fn ask_winners(&self) -> Result<Option<Vec<String>>, AgencyErr> {
        let response = self.exchange(&message::winners_request(self.id)).await?;
        Ok(message::parse_winners(&response))
    }

    async fn exchange(&self, payload: &str) -> Result<String, AgencyErr> {
        let mut stream = BufReader::new(TcpStream::connect(self.server).await?);

        framing::write_message(&mut stream, payload).await?;
        tracing::debug!("agency {} sent {:?}", self.id, payload);

        let response = framing::read_message(&mut stream).await?;
        tracing::debug!("agency {} received {:?}", self.id, response);

        Ok(response)
    }
}
