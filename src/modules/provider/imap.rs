use crate::modules::account::entity::{AuthType, Encryption, ImapConfig};
use crate::modules::common::AddrVec;
use crate::modules::error::code::ErrorCode;
use crate::modules::error::NuboResult;
use crate::modules::provider::session::{
    establish_tcp_connection_with_timeout, establish_tls_connection, establish_tls_stream,
    SessionStream,
};
use crate::modules::provider::{
    EmailFlags, RemoteAttachment, RemoteContent, RemoteEnvelope, RemoteFolderStatus,
};
use crate::raise_error;
use imap_proto::BodyStructure;
use async_imap::types::{Fetch, Flag, Mailbox};
use async_imap::{Client as ImapClient, Session as ImapSession};
use futures::TryStreamExt;
use mail_parser::{MessageParser, MimeHeaders};
use std::net::{SocketAddr, ToSocketAddrs};
use tokio::io::BufWriter;
use tracing::{debug, warn};

/// The IMAP query used during header sync: everything needed to build a
/// cache row without downloading the body.
const HEADER_QUERY: &str = "(UID BODYSTRUCTURE RFC822.SIZE INTERNALDATE FLAGS BODY.PEEK[HEADER.FIELDS (CC Date From Message-ID Subject To)])";

const UID_FLAGS_QUERY: &str = "(UID FLAGS)";

const FULL_MESSAGE_QUERY: &str = "(UID BODY.PEEK[])";

type Session = ImapSession<Box<dyn SessionStream>>;

/// IMAP adapter: one short-lived authenticated session per operation.
pub struct ImapMailer {
    email: String,
    config: ImapConfig,
}

struct XOAuth2 {
    user: String,
    access_token: String,
}

impl async_imap::Authenticator for XOAuth2 {
    type Response = String;

    fn process(&mut self, _data: &[u8]) -> Self::Response {
        format!(
            "user={}\x01auth=Bearer {}\x01\x01",
            self.user, self.access_token
        )
    }
}

fn alpn(port: u16) -> &'static [&'static str] {
    if port == 993 {
        &[]
    } else {
        &["imap"]
    }
}

impl ImapMailer {
    pub fn new(email: String, config: ImapConfig) -> Self {
        Self { email, config }
    }

    pub async fn folder_status(&self, folder: &str) -> NuboResult<RemoteFolderStatus> {
        let mut session = self.open_session().await?;
        let mailbox = self.examine(&mut session, folder).await?;
        let status = Self::mailbox_status(&mailbox)?;
        Self::logout(session).await;
        Ok(status)
    }

    pub async fn list_uids(&self, folder: &str) -> NuboResult<Vec<u32>> {
        let mut session = self.open_session().await?;
        self.examine(&mut session, folder).await?;
        let found = session
            .uid_search("ALL")
            .await
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::ImapCommandFailed))?;
        Self::logout(session).await;
        let mut uids: Vec<u32> = found.into_iter().collect();
        uids.sort_unstable();
        Ok(uids)
    }

    pub async fn fetch_headers_since(
        &self,
        folder: &str,
        after_uid: u32,
    ) -> NuboResult<Vec<RemoteEnvelope>> {
        let mut session = self.open_session().await?;
        self.examine(&mut session, folder).await?;
        let uid_set = format!("{}:*", after_uid.saturating_add(1));
        let fetches = Self::collect_fetch(
            session
                .uid_fetch(uid_set.as_str(), HEADER_QUERY)
                .await
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::ImapCommandFailed))?,
        )
        .await?;
        Self::logout(session).await;

        // Servers answer `n:*` with the last message even when nothing is
        // newer than the checkpoint; drop anything at or below it.
        let mut envelopes = Vec::with_capacity(fetches.len());
        for fetch in &fetches {
            match extract_envelope(fetch) {
                Ok(envelope) if envelope.uid > after_uid => envelopes.push(envelope),
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "skipping unparsable message");
                }
            }
        }
        Ok(envelopes)
    }

    pub async fn fetch_recent_headers(
        &self,
        folder: &str,
        window: u32,
    ) -> NuboResult<Vec<RemoteEnvelope>> {
        let mut session = self.open_session().await?;
        let mailbox = self.examine(&mut session, folder).await?;
        let total = mailbox.exists;
        if total == 0 {
            Self::logout(session).await;
            return Ok(Vec::new());
        }
        let start = total.saturating_sub(window).saturating_add(1).max(1);
        let sequence_set = format!("{}:{}", start, total);
        debug!("Initial sync sequence range: {}", sequence_set);

        let fetches = Self::collect_fetch(
            session
                .fetch(sequence_set.as_str(), HEADER_QUERY)
                .await
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::ImapCommandFailed))?,
        )
        .await?;
        Self::logout(session).await;

        let mut envelopes = Vec::with_capacity(fetches.len());
        for fetch in &fetches {
            match extract_envelope(fetch) {
                Ok(envelope) => envelopes.push(envelope),
                Err(e) => {
                    warn!(error = %e, "skipping unparsable message");
                }
            }
        }
        Ok(envelopes)
    }

    pub async fn fetch_flags(
        &self,
        folder: &str,
        max_uid: u32,
    ) -> NuboResult<Vec<(u32, EmailFlags)>> {
        if max_uid == 0 {
            return Ok(Vec::new());
        }
        let mut session = self.open_session().await?;
        self.examine(&mut session, folder).await?;
        let uid_set = format!("1:{}", max_uid);
        let fetches = Self::collect_fetch(
            session
                .uid_fetch(uid_set.as_str(), UID_FLAGS_QUERY)
                .await
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::ImapCommandFailed))?,
        )
        .await?;
        Self::logout(session).await;

        let mut result = Vec::with_capacity(fetches.len());
        for fetch in &fetches {
            if let Some(uid) = fetch.uid {
                result.push((uid, flags_from_fetch(fetch)));
            }
        }
        Ok(result)
    }

    pub async fn fetch_message(&self, folder: &str, uid: u32) -> NuboResult<RemoteContent> {
        let fetch = self.fetch_full_message(folder, uid).await?;
        let body = fetch.body().ok_or_else(|| {
            raise_error!(
                format!("Message uid={uid} has no body section"),
                ErrorCode::MessageParseError
            )
        })?;
        let message = MessageParser::new().parse(body).ok_or_else(|| {
            raise_error!(
                format!("Failed to parse message uid={uid}"),
                ErrorCode::MessageParseError
            )
        })?;

        let attachments = message
            .attachments()
            .enumerate()
            .map(|(index, part)| RemoteAttachment {
                part_number: (index + 1).to_string(),
                filename: part.attachment_name().map(String::from),
                content_type: part
                    .content_type()
                    .map(|ct| match ct.subtype() {
                        Some(subtype) => format!("{}/{}", ct.ctype(), subtype),
                        None => ct.ctype().to_string(),
                    })
                    .unwrap_or_else(|| "application/octet-stream".to_string()),
                size: part.contents().len() as u32,
                inline: part.content_disposition().map_or(false, |cd| {
                    cd.ctype().eq_ignore_ascii_case("inline")
                }),
                content_id: part.content_id().map(String::from),
            })
            .collect();

        Ok(RemoteContent {
            text: message.body_text(0).map(|t| t.into_owned()),
            html: message.body_html(0).map(|t| t.into_owned()),
            attachments,
        })
    }

    pub async fn fetch_attachment(
        &self,
        folder: &str,
        uid: u32,
        part_number: &str,
    ) -> NuboResult<Vec<u8>> {
        let index: usize = part_number.parse().map_err(|_| {
            raise_error!(
                format!("Invalid attachment part number '{part_number}'"),
                ErrorCode::InvalidParameter
            )
        })?;
        let fetch = self.fetch_full_message(folder, uid).await?;
        let body = fetch.body().ok_or_else(|| {
            raise_error!(
                format!("Message uid={uid} has no body section"),
                ErrorCode::MessageParseError
            )
        })?;
        let message = MessageParser::new().parse(body).ok_or_else(|| {
            raise_error!(
                format!("Failed to parse message uid={uid}"),
                ErrorCode::MessageParseError
            )
        })?;
        let part = message
            .attachments()
            .nth(index.saturating_sub(1))
            .ok_or_else(|| {
                raise_error!(
                    format!("Message uid={uid} has no attachment part {part_number}"),
                    ErrorCode::ResourceNotFound
                )
            })?;
        Ok(part.contents().to_vec())
    }

    pub async fn push_flags(&self, folder: &str, uid: u32, flags: EmailFlags) -> NuboResult<()> {
        let mut session = self.open_session().await?;
        self.select(&mut session, folder).await?;
        let flag_list = flags.to_imap_flags().join(" ");
        let query = format!("FLAGS ({})", flag_list);
        let updates = session
            .uid_store(uid.to_string().as_str(), query.as_str())
            .await
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::ImapCommandFailed))?;
        Self::collect_fetch(updates).await?;
        Self::logout(session).await;
        Ok(())
    }

    pub async fn move_message(&self, folder: &str, uid: u32, target: &str) -> NuboResult<()> {
        let mut session = self.open_session().await?;
        self.select(&mut session, folder).await?;
        session
            .uid_mv(uid.to_string().as_str(), target)
            .await
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::ImapCommandFailed))?;
        Self::logout(session).await;
        Ok(())
    }

    pub async fn delete_message(&self, folder: &str, uid: u32) -> NuboResult<()> {
        let mut session = self.open_session().await?;
        self.select(&mut session, folder).await?;
        let updates = session
            .uid_store(uid.to_string().as_str(), "+FLAGS (\\Deleted)")
            .await
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::ImapCommandFailed))?;
        Self::collect_fetch(updates).await?;
        let expunged = session
            .expunge()
            .await
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::ImapCommandFailed))?;
        expunged
            .try_collect::<Vec<_>>()
            .await
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::ImapCommandFailed))?;
        Self::logout(session).await;
        Ok(())
    }

    async fn fetch_full_message(&self, folder: &str, uid: u32) -> NuboResult<Fetch> {
        let mut session = self.open_session().await?;
        self.examine(&mut session, folder).await?;
        let mut stream = session
            .uid_fetch(uid.to_string().as_str(), FULL_MESSAGE_QUERY)
            .await
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::ImapCommandFailed))?;
        let fetch = stream
            .try_next()
            .await
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::ImapCommandFailed))?;
        drop(stream);
        Self::logout(session).await;
        fetch.ok_or_else(|| {
            raise_error!(
                format!("Message uid={uid} not found on remote server"),
                ErrorCode::ResourceNotFound
            )
        })
    }

    async fn collect_fetch(
        stream: impl futures::Stream<Item = async_imap::error::Result<Fetch>> + Unpin,
    ) -> NuboResult<Vec<Fetch>> {
        stream
            .try_collect::<Vec<Fetch>>()
            .await
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::ImapCommandFailed))
    }

    async fn examine(&self, session: &mut Session, folder: &str) -> NuboResult<Mailbox> {
        let encoded = crate::encode_folder_name!(folder);
        session.examine(encoded.as_str()).await.map_err(|e| {
            raise_error!(
                format!("Failed to open folder '{}': {:#?}", folder, e),
                ErrorCode::RemoteFolderMissing
            )
        })
    }

    async fn select(&self, session: &mut Session, folder: &str) -> NuboResult<Mailbox> {
        let encoded = crate::encode_folder_name!(folder);
        session.select(encoded.as_str()).await.map_err(|e| {
            raise_error!(
                format!("Failed to open folder '{}': {:#?}", folder, e),
                ErrorCode::RemoteFolderMissing
            )
        })
    }

    fn mailbox_status(mailbox: &Mailbox) -> NuboResult<RemoteFolderStatus> {
        let uid_validity = mailbox.uid_validity.ok_or_else(|| {
            raise_error!(
                "Server reported no UIDVALIDITY for folder".into(),
                ErrorCode::ImapUnexpectedResult
            )
        })?;
        Ok(RemoteFolderStatus {
            uid_validity,
            exists: mailbox.exists,
        })
    }

    async fn logout(mut session: Session) {
        if let Err(e) = session.logout().await {
            debug!("IMAP logout failed: {:#?}", e);
        }
    }

    async fn open_session(&self) -> NuboResult<Session> {
        let client = self.connect().await?;
        match self.config.auth.auth_type {
            AuthType::Password => {
                let password = self.config.auth.password.as_deref().ok_or_else(|| {
                    raise_error!(
                        "Account has no IMAP password configured".into(),
                        ErrorCode::ImapAuthenticationFailed
                    )
                })?;
                client
                    .login(self.email.as_str(), password)
                    .await
                    .map_err(|(e, _)| {
                        raise_error!(format!("{:#?}", e), ErrorCode::ImapAuthenticationFailed)
                    })
            }
            AuthType::OAuth2 => {
                let access_token = self.config.auth.access_token.clone().ok_or_else(|| {
                    raise_error!(
                        "Account has no OAuth2 access token configured".into(),
                        ErrorCode::ImapAuthenticationFailed
                    )
                })?;
                let authenticator = XOAuth2 {
                    user: self.email.clone(),
                    access_token,
                };
                client
                    .authenticate("XOAUTH2", authenticator)
                    .await
                    .map_err(|(e, _)| {
                        raise_error!(format!("{:#?}", e), ErrorCode::ImapAuthenticationFailed)
                    })
            }
        }
    }

    async fn connect(&self) -> NuboResult<ImapClient<Box<dyn SessionStream>>> {
        let address = Self::resolve_to_socket_addr(&self.config.host, self.config.port)?;
        debug!(
            "Attempting IMAP connection to {} ({address})",
            self.config.host
        );
        match self.config.encryption {
            Encryption::Ssl => self.establish_secure_connection(address).await,
            Encryption::StartTls => self.establish_starttls_connection(address).await,
            Encryption::None => self.establish_insecure_connection(address).await,
        }
    }

    async fn establish_secure_connection(
        &self,
        address: SocketAddr,
    ) -> NuboResult<ImapClient<Box<dyn SessionStream>>> {
        let tls_stream =
            establish_tls_connection(address, &self.config.host, alpn(address.port())).await?;
        let buffered_stream = BufWriter::new(tls_stream);
        let session_stream: Box<dyn SessionStream> = Box::new(buffered_stream);
        let mut client = ImapClient::new(session_stream);
        Self::read_greeting(&mut client).await?;
        Ok(client)
    }

    async fn establish_insecure_connection(
        &self,
        address: SocketAddr,
    ) -> NuboResult<ImapClient<Box<dyn SessionStream>>> {
        let tcp_stream = establish_tcp_connection_with_timeout(address).await?;
        let buffered_stream = BufWriter::new(tcp_stream);
        let session_stream: Box<dyn SessionStream> = Box::new(buffered_stream);
        let mut client = ImapClient::new(session_stream);
        Self::read_greeting(&mut client).await?;
        Ok(client)
    }

    async fn establish_starttls_connection(
        &self,
        address: SocketAddr,
    ) -> NuboResult<ImapClient<Box<dyn SessionStream>>> {
        let tcp_stream = establish_tcp_connection_with_timeout(address).await?;
        let buffered_tcp_stream = BufWriter::new(tcp_stream);
        let mut client = async_imap::Client::new(buffered_tcp_stream);
        Self::read_greeting(&mut client).await?;

        client
            .run_command_and_check_ok("STARTTLS", None)
            .await
            .map_err(|_| {
                raise_error!(
                    "STARTTLS command failed".into(),
                    ErrorCode::ImapCommandFailed
                )
            })?;

        let buffered_tcp_stream = client.into_inner();
        let tcp_stream = buffered_tcp_stream.into_inner();
        let tls_stream = establish_tls_stream(&self.config.host, &[], tcp_stream).await?;
        let buffered_stream = BufWriter::new(tls_stream);
        let session_stream: Box<dyn SessionStream> = Box::new(buffered_stream);
        let client = ImapClient::new(session_stream);
        Ok(client)
    }

    async fn read_greeting<T: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + std::fmt::Debug>(
        client: &mut ImapClient<T>,
    ) -> NuboResult<()> {
        let _greeting = client
            .read_response()
            .await
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::ImapCommandFailed))?
            .ok_or_else(|| {
                raise_error!(
                    "failed to read greeting".into(),
                    ErrorCode::ImapCommandFailed
                )
            })?;
        Ok(())
    }

    fn resolve_to_socket_addr(domain: &str, port: u16) -> NuboResult<SocketAddr> {
        if domain.is_empty() || domain.contains(|c: char| !c.is_ascii() && c != '.') {
            return Err(raise_error!(
                "Invalid domain format".into(),
                ErrorCode::InvalidParameter
            ));
        }
        let address = format!("{}:{}", domain, port);
        let socket_addrs = address
            .to_socket_addrs()
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::NetworkError))?;
        socket_addrs.into_iter().next().ok_or_else(|| {
            raise_error!("Unable to resolve address".into(), ErrorCode::NetworkError)
        })
    }
}

fn flags_from_fetch(fetch: &Fetch) -> EmailFlags {
    let mut flags = EmailFlags::default();
    for flag in fetch.flags() {
        match flag {
            Flag::Seen => flags.is_read = true,
            Flag::Flagged => flags.is_starred = true,
            Flag::Deleted => flags.is_trash = true,
            Flag::Custom(name) => {
                let name = name.trim_start_matches('$').trim_start_matches('\\');
                if name.eq_ignore_ascii_case("Junk") || name.eq_ignore_ascii_case("Spam") {
                    flags.is_spam = true;
                } else if name.eq_ignore_ascii_case("Archived") {
                    flags.is_archived = true;
                }
            }
            _ => {}
        }
    }
    flags
}

fn extract_envelope(fetch: &Fetch) -> NuboResult<RemoteEnvelope> {
    let uid = fetch
        .uid
        .ok_or_else(|| raise_error!("No uid available".into(), ErrorCode::MessageParseError))?;
    let size = fetch.size.unwrap_or(0);
    let internal_date = fetch
        .internal_date()
        .map(|d| d.timestamp_millis())
        .unwrap_or_else(|| crate::utc_now!());

    let header = fetch
        .header()
        .ok_or_else(|| raise_error!("No header available".into(), ErrorCode::MessageParseError))?;
    let message = MessageParser::new().parse(header).ok_or_else(|| {
        raise_error!(
            "Email header parse result is not available".into(),
            ErrorCode::MessageParseError
        )
    })?;

    let attachment_count = fetch
        .bodystructure()
        .map(count_attachments)
        .unwrap_or_default();

    Ok(RemoteEnvelope {
        uid,
        internal_date,
        size,
        subject: message.subject().map(String::from),
        from: message
            .from()
            .and_then(|addr| AddrVec::from(addr).0.first().cloned()),
        to: message
            .to()
            .map(|addr| AddrVec::from(addr).0)
            .unwrap_or_default(),
        cc: message
            .cc()
            .map(|addr| AddrVec::from(addr).0)
            .unwrap_or_default(),
        flags: flags_from_fetch(fetch),
        attachment_count,
        snippet: None,
    })
}

fn count_attachments(structure: &BodyStructure<'_>) -> u32 {
    match structure {
        BodyStructure::Multipart { bodies, .. } => bodies.iter().map(count_attachments).sum(),
        BodyStructure::Basic { common, .. }
        | BodyStructure::Message { common, .. }
        | BodyStructure::Text { common, .. } => match &common.disposition {
            Some(disposition) if disposition.ty.eq_ignore_ascii_case("attachment") => 1,
            _ => 0,
        },
    }
}
