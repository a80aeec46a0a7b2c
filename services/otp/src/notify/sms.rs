use std::future::Future;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::Instant;

use crate::config::SmppSettings;
use crate::notify::smpp::{
    BIND_TRANSMITTER, BIND_TRANSMITTER_RESP, BindTransmitter, ENQUIRE_LINK, ESME_RINVCMDID,
    GENERIC_NACK, Pdu, SUBMIT_SM, SUBMIT_SM_RESP, SmppError, SubmitSm, UNBIND, UNBIND_RESP, response_id,
};

const SERVICE_TYPE: &str = "CMT";
const SESSION_TIMEOUT: Duration = Duration::from_secs(10);
const UNBIND_TIMEOUT: Duration = Duration::from_secs(2);

/// Sends codes as SMS through an SMPP transmitter session opened per message.
pub struct SmsNotifier {
    settings: SmppSettings,
    timeout: Duration,
}

impl SmsNotifier {
    pub fn new(settings: SmppSettings) -> Self {
        Self {
            settings,
            timeout: SESSION_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Bind, submit and unbind. Bind and submit share one deadline; once bound,
    /// unbind is always attempted under its own short deadline, including after
    /// a submit that failed or timed out.
    pub async fn send(&self, phone: &str, code: &str) -> Result<(), SmppError> {
        let text = format!("Your one-time code: {code}");
        let deadline = Instant::now() + self.timeout;

        let mut session = within(deadline, self.open()).await?;
        let submitted = within(
            deadline,
            session.submit(SubmitSm {
                service_type: SERVICE_TYPE.to_owned(),
                source_addr: self.settings.source_addr.clone(),
                destination_addr: phone.to_owned(),
                short_message: text.into(),
            }),
        )
        .await;

        // A failed unbind never masks the submit outcome.
        let unbind_deadline = Instant::now() + self.timeout.min(UNBIND_TIMEOUT);
        if let Err(e) = within(unbind_deadline, session.unbind()).await {
            tracing::warn!(error = %e, "smpp unbind failed");
        }

        let message_id = submitted?;
        tracing::debug!(message_id = %message_id, "smpp submit accepted");
        Ok(())
    }

    async fn open(&self) -> Result<SmppSession, SmppError> {
        let stream =
            TcpStream::connect((self.settings.host.as_str(), self.settings.port)).await?;
        let mut session = SmppSession::new(stream);
        session
            .bind(BindTransmitter {
                system_id: self.settings.system_id.clone(),
                password: self.settings.password.clone(),
                system_type: self.settings.system_type.clone(),
            })
            .await?;
        Ok(session)
    }
}

async fn within<T>(
    deadline: Instant,
    step: impl Future<Output = Result<T, SmppError>>,
) -> Result<T, SmppError> {
    tokio::time::timeout_at(deadline, step)
        .await
        .map_err(|_| SmppError::Timeout)?
}

/// One bound SMPP connection. Dropping it closes the socket.
struct SmppSession {
    stream: TcpStream,
    read_buf: BytesMut,
    next_sequence: u32,
}

impl SmppSession {
    fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            read_buf: BytesMut::with_capacity(1024),
            next_sequence: 1,
        }
    }

    async fn bind(&mut self, bind: BindTransmitter) -> Result<String, SmppError> {
        let resp = self
            .call(BIND_TRANSMITTER, bind.encode()?, BIND_TRANSMITTER_RESP)
            .await?;
        response_id(&resp.body)
    }

    async fn submit(&mut self, submit: SubmitSm) -> Result<String, SmppError> {
        let resp = self
            .call(SUBMIT_SM, submit.encode()?, SUBMIT_SM_RESP)
            .await?;
        response_id(&resp.body)
    }

    async fn unbind(&mut self) -> Result<(), SmppError> {
        self.call(UNBIND, Bytes::new(), UNBIND_RESP).await?;
        Ok(())
    }

    async fn call(
        &mut self,
        command_id: u32,
        body: Bytes,
        expected: u32,
    ) -> Result<Pdu, SmppError> {
        let sequence = self.next_sequence;
        self.next_sequence = self.next_sequence.wrapping_add(1).max(1);
        self.write(&Pdu::request(command_id, sequence, body)).await?;

        loop {
            let pdu = self.read().await?;
            if !pdu.is_response() {
                // The SMSC may send enquire_link or other requests mid-exchange.
                let status = if pdu.command_id == ENQUIRE_LINK {
                    0
                } else {
                    ESME_RINVCMDID
                };
                self.write(&pdu.response(status, Bytes::new())).await?;
                continue;
            }
            if pdu.command_id == GENERIC_NACK {
                return Err(SmppError::Rejected {
                    command_id,
                    status: pdu.command_status,
                });
            }
            if pdu.command_id != expected {
                return Err(SmppError::UnexpectedCommand {
                    expected,
                    actual: pdu.command_id,
                });
            }
            if pdu.sequence_number != sequence {
                return Err(SmppError::SequenceMismatch {
                    expected: sequence,
                    actual: pdu.sequence_number,
                });
            }
            if pdu.command_status != 0 {
                return Err(SmppError::Rejected {
                    command_id,
                    status: pdu.command_status,
                });
            }
            return Ok(pdu);
        }
    }

    async fn write(&mut self, pdu: &Pdu) -> Result<(), SmppError> {
        self.stream.write_all(&pdu.encode()).await?;
        Ok(())
    }

    async fn read(&mut self) -> Result<Pdu, SmppError> {
        loop {
            if let Some(pdu) = Pdu::decode(&mut self.read_buf)? {
                return Ok(pdu);
            }
            if self.stream.read_buf(&mut self.read_buf).await? == 0 {
                return Err(SmppError::Io(std::io::ErrorKind::UnexpectedEof.into()));
            }
        }
    }
}
