// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// TCP ACTION TRANSPORT
//
// spec.md keeps the encrypted handshake transport external (§1): the
// real deployment wraps every connection in whatever authenticated,
// encrypted channel the operator's transport layer provides, and the
// gateway only ever sees `AuthenticatedTransport`. `TcpActionTransport`
// is a minimal stand-in over a plain TCP socket, in the same spirit as
// `archive::NullArchive` — sufficient to run the node end-to-end without
// a separate transport product. The peer announces its token as the
// first 32 bytes of the connection (no cryptographic authentication of
// the connection itself); every action frame that follows is still
// checked by the Chain Engine's validator against its own embedded
// signature, so forging a token here only ever buys a rejected action.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use pactum_crypto::Token;
use pactum_net::AuthenticatedTransport;
use std::io;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;

/// Matches the 64 KiB `VOID_MAX_PAYLOAD` ceiling in `pactum-core`, plus
/// slack for the rest of an action's fixed fields.
const MAX_FRAME_LEN: u32 = 128 * 1024;

pub struct TcpActionTransport {
    stream: TcpStream,
    token: Token,
}

impl TcpActionTransport {
    /// Reads the peer's announced token before handing the transport to
    /// the gateway.
    pub async fn accept(mut stream: TcpStream) -> io::Result<Self> {
        let mut token_bytes = [0u8; 32];
        stream.read_exact(&mut token_bytes).await?;
        let token =
            Token::from_slice(&token_bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
        Ok(TcpActionTransport { stream, token })
    }
}

#[async_trait::async_trait]
impl AuthenticatedTransport for TcpActionTransport {
    fn peer_token(&self) -> Token {
        self.token
    }

    async fn recv_action(&mut self) -> Option<Vec<u8>> {
        let mut len_bytes = [0u8; 4];
        self.stream.read_exact(&mut len_bytes).await.ok()?;
        let len = u32::from_le_bytes(len_bytes);
        if len == 0 || len > MAX_FRAME_LEN {
            return None;
        }
        let mut payload = vec![0u8; len as usize];
        self.stream.read_exact(&mut payload).await.ok()?;
        Some(payload)
    }
}
