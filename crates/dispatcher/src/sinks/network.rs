//! NetworkSink - publish records as UDP datagrams
//!
//! Each `Publish` record becomes one JSON datagram
//! `{"topic": .., "retain": .., "payload": ..}`. Delivery is best-effort.

use std::collections::HashMap;
use std::net::SocketAddr;

use contracts::{ContractError, DataSink, RecordKind, SinkRecord};
use serde::Serialize;
use tokio::net::UdpSocket;
use tracing::{debug, error, instrument};

/// Largest payload that fits one IPv4 UDP datagram
const MAX_UDP_PAYLOAD: usize = 65_507;

/// Configuration for NetworkSink
#[derive(Debug, Clone)]
pub struct NetworkSinkConfig {
    /// Target address
    pub addr: SocketAddr,
    /// Datagrams larger than this are refused
    pub max_packet_size: usize,
}

impl NetworkSinkConfig {
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, String> {
        let addr_str = params
            .get("addr")
            .ok_or_else(|| "missing 'addr' parameter".to_string())?;

        let addr: SocketAddr = addr_str
            .parse()
            .map_err(|e| format!("invalid address '{addr_str}': {e}"))?;

        let max_packet_size = match params.get("max_packet_size") {
            Some(s) => s
                .parse::<usize>()
                .map_err(|e| format!("invalid max_packet_size '{s}': {e}"))?
                .min(MAX_UDP_PAYLOAD),
            None => MAX_UDP_PAYLOAD,
        };

        Ok(Self {
            addr,
            max_packet_size,
        })
    }
}

/// Wire form of one published message
#[derive(Debug, Serialize)]
struct Datagram<'a> {
    topic: &'a str,
    retain: bool,
    payload: &'a str,
}

/// Sink that sends `Publish` records over UDP
pub struct NetworkSink {
    name: String,
    config: NetworkSinkConfig,
    socket: Option<UdpSocket>,
}

impl NetworkSink {
    #[instrument(name = "network_sink_new", skip(name, config), fields(target = %config.addr))]
    pub async fn new(name: impl Into<String>, config: NetworkSinkConfig) -> std::io::Result<Self> {
        let name = name.into();
        let bind_addr = if config.addr.is_ipv4() {
            "0.0.0.0:0"
        } else {
            "[::]:0"
        };
        let socket = UdpSocket::bind(bind_addr).await?;
        socket.connect(&config.addr).await?;

        debug!(sink = %name, target = %config.addr, "NetworkSink connected");

        Ok(Self {
            name,
            config,
            socket: Some(socket),
        })
    }

    #[instrument(name = "network_sink_from_params", skip(name, params))]
    pub async fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> Result<Self, ContractError> {
        let name = name.into();
        let config = NetworkSinkConfig::from_params(params)
            .map_err(|e| ContractError::sink_write(&name, e))?;

        Self::new(&name, config)
            .await
            .map_err(|e| ContractError::SinkConnection {
                sink_name: name,
                message: e.to_string(),
            })
    }

    fn encode(&self, topic: &str, payload: &str, retain: bool) -> Result<Vec<u8>, ContractError> {
        let data = serde_json::to_vec(&Datagram {
            topic,
            retain,
            payload,
        })
        .map_err(|e| ContractError::sink_write(&self.name, format!("json error: {e}")))?;

        if data.len() > self.config.max_packet_size {
            return Err(ContractError::sink_write(
                &self.name,
                format!(
                    "datagram of {} bytes exceeds max_packet_size {}",
                    data.len(),
                    self.config.max_packet_size
                ),
            ));
        }
        Ok(data)
    }
}

impl DataSink for NetworkSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn accepts(&self, kind: RecordKind) -> bool {
        kind == RecordKind::Publish
    }

    #[instrument(
        name = "network_sink_write",
        skip(self, record),
        fields(sink = %self.name)
    )]
    async fn write(&mut self, record: &SinkRecord) -> Result<(), ContractError> {
        let SinkRecord::Publish {
            topic,
            payload,
            retain,
        } = record
        else {
            return Err(ContractError::sink_write(
                &self.name,
                format!("unsupported record kind '{}'", record.kind().as_str()),
            ));
        };

        let data = self.encode(topic, payload, *retain)?;
        let socket = self
            .socket
            .as_ref()
            .ok_or_else(|| ContractError::sink_write(&self.name, "socket not connected"))?;

        match socket.send(&data).await {
            Ok(sent) => debug!(sink = %self.name, topic = %topic, bytes = sent, "Sent"),
            // Best-effort: a missing listener is not a sink failure
            Err(e) => error!(sink = %self.name, error = %e, "UDP send failed"),
        }
        Ok(())
    }

    #[instrument(name = "network_sink_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    #[instrument(name = "network_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        self.socket = None;
        debug!(sink = %self.name, "NetworkSink closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_network_sink_config_parsing() {
        let mut params = HashMap::new();
        params.insert("addr".to_string(), "127.0.0.1:9999".to_string());
        params.insert("max_packet_size".to_string(), "1200".to_string());

        let config = NetworkSinkConfig::from_params(&params).unwrap();
        assert_eq!(config.addr.port(), 9999);
        assert_eq!(config.max_packet_size, 1200);

        assert!(NetworkSinkConfig::from_params(&HashMap::new()).is_err());
        params.insert("addr".to_string(), "not-an-addr".to_string());
        assert!(NetworkSinkConfig::from_params(&params).is_err());
    }

    #[tokio::test]
    async fn test_publish_datagram_received() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let config = NetworkSinkConfig {
            addr: receiver.local_addr().unwrap(),
            max_packet_size: MAX_UDP_PAYLOAD,
        };
        let mut sink = NetworkSink::new("udp", config).await.unwrap();

        sink.write(&SinkRecord::Publish {
            topic: "teslams/stream".into(),
            payload: r#"{"ts":1}"#.into(),
            retain: true,
        })
        .await
        .unwrap();

        let mut buf = vec![0u8; 2048];
        let n = receiver.recv(&mut buf).await.unwrap();
        let datagram: Value = serde_json::from_slice(&buf[..n]).unwrap();
        assert_eq!(datagram["topic"], "teslams/stream");
        assert_eq!(datagram["retain"], true);
        assert_eq!(datagram["payload"], r#"{"ts":1}"#);
    }

    #[tokio::test]
    async fn test_oversized_datagram_refused() {
        let config = NetworkSinkConfig {
            addr: "127.0.0.1:19998".parse().unwrap(),
            max_packet_size: 16,
        };
        let mut sink = NetworkSink::new("udp", config).await.unwrap();
        let result = sink
            .write(&SinkRecord::Publish {
                topic: "teslams/stream".into(),
                payload: "x".repeat(64),
                retain: false,
            })
            .await;
        assert!(result.is_err());
        assert!(sink.write(&SinkRecord::line("x")).await.is_err());
    }
}
