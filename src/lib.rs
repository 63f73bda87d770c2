//! # meshcom-gateway - Serial Logger and UDP Relay for MeshCom Nodes
//!
//! The gateway sits between a MeshCom mesh radio node attached over USB/UART and
//! the local machine:
//!
//! - every JSON frame the node prints on its serial console is extracted,
//!   normalized and stored in SQLite, one table per frame type, with columns that
//!   appear automatically as new fields show up;
//! - local applications can transmit on the mesh by sending `MSG_OUT:<text>` UDP
//!   datagrams, which are relayed to the node as `::<text>` serial commands.
//!
//! The stored tables are read directly by external viewers that poll by row id.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use meshcom_gateway::config::Config;
//! use meshcom_gateway::frame::processor::FrameProcessor;
//! use meshcom_gateway::gateway::Gateway;
//! use meshcom_gateway::serial::SerialLink;
//! use meshcom_gateway::storage::SchemaStore;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     let store = SchemaStore::open(config.database_path()?)?;
//!     let (reader, _writer) = SerialLink::open(&config.serial).await?;
//!     let mut gateway = Gateway::new(reader, FrameProcessor::new(store, &config.node.callsign));
//!     tokio::task::spawn_blocking(move || gateway.run()).await??;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`serial`] - serial link: line reader and shared, locked writer
//! - [`frame`] - frame extraction, classification and normalization
//! - [`storage`] - dynamic-schema SQLite store
//! - [`relay`] - UDP to serial relay listener
//! - [`gateway`] - the read/extract/process loop
//! - [`config`] - configuration loading and validation
//!
//! ## Architecture
//!
//! ```text
//!  serial port ──► LineReader ──► extract_frame ──► FrameProcessor ──► SchemaStore
//!       ▲
//!       └──────── SerialWriter (mutex) ◄──── UdpRelay ◄──── UDP :1703
//! ```

pub mod config;
pub mod frame;
pub mod gateway;
pub mod logutil;
pub mod metrics;
pub mod relay;
pub mod serial;
pub mod storage;
pub mod validation;
