//! Store labels and output plugin blocks

use super::ConfWriter;
use crate::config::BufferTuning;
use crate::crds::OutputType;
use crate::graph::Store;
use std::fmt;

/// Fluentd ruby expression resolving the node name at collector start
const NODE_NAME: &str = "\"#{ENV['NODE_NAME']}\"";

/// Which of a store's two variants is being written
#[derive(Clone, Copy, PartialEq, Eq)]
enum Variant {
    Normal,
    Retry,
}

pub(super) fn write_store_label(w: &mut ConfWriter, store: &Store) -> fmt::Result {
    w.open("label", &store.label)?;
    match &store.retry {
        Some(retry) => {
            w.open("match", &retry.tag)?;
            w.param("@type", "copy")?;
            w.open("store", "")?;
            write_plugin(w, store, Variant::Retry)?;
            w.close("store")?;
            w.close("match")?;

            w.open("match", "**")?;
            w.param("@type", "copy")?;
            w.open("store", "")?;
            write_plugin(w, store, Variant::Normal)?;
            w.close("store")?;
            w.close("match")?;
        }
        None => {
            w.open("match", "**")?;
            write_plugin(w, store, Variant::Normal)?;
            w.close("match")?;
        }
    }
    w.close("label")?;
    w.blank()
}

fn write_plugin(w: &mut ConfWriter, store: &Store, variant: Variant) -> fmt::Result {
    let (id, buffer_path) = match (variant, &store.retry) {
        (Variant::Retry, Some(retry)) => (retry.id.as_str(), retry.buffer_path.as_str()),
        _ => (store.id.as_str(), store.buffer_path.as_str()),
    };

    match store.output_type {
        OutputType::Elasticsearch => write_elasticsearch(w, store, id, variant)?,
        OutputType::FluentdForward => write_forward(w, store, id)?,
        OutputType::Syslog => write_syslog(w, store, id)?,
    }
    write_buffer(w, buffer_path, &store.buffer)
}

fn write_elasticsearch(w: &mut ConfWriter, store: &Store, id: &str, variant: Variant) -> fmt::Result {
    w.param("@type", "elasticsearch")?;
    w.param("@id", id)?;
    w.param("host", &store.endpoint.host)?;
    w.param("port", store.endpoint.port)?;
    w.param("verify_es_version_at_startup", false)?;
    w.param("scheme", &store.endpoint.scheme)?;
    if store.endpoint.is_tls() {
        w.param("ssl_version", "TLSv1_2")?;
    }
    if let Some(tls) = &store.tls {
        w.param("client_key", &tls.key)?;
        w.param("client_cert", &tls.cert)?;
        w.param("ca_file", &tls.ca_bundle)?;
    }
    w.param("target_index_key", "viaq_index_name")?;
    w.param("id_key", "viaq_msg_id")?;
    w.param("remove_keys", "viaq_index_name")?;
    w.param("type_name", "_doc")?;
    w.param("write_operation", "create")?;
    w.param("reload_connections", "'true'")?;
    w.param("reload_after", 200)?;
    w.param("reload_on_failure", false)?;
    w.param("request_timeout", "2147483648")?;
    if variant == Variant::Normal {
        if let Some(retry) = &store.retry {
            w.param("retry_tag", &retry.tag)?;
        }
    }
    Ok(())
}

fn write_forward(w: &mut ConfWriter, store: &Store, id: &str) -> fmt::Result {
    w.param("@type", "forward")?;
    w.param("@id", id)?;
    w.param("heartbeat_type", "none")?;
    w.param("keepalive", true)?;
    if store.endpoint.is_tls() {
        w.param("transport", "tls")?;
        w.param("tls_verify_hostname", false)?;
        w.param("tls_version", "'TLSv1_2'")?;
        if let Some(tls) = &store.tls {
            w.param("tls_client_private_key_path", &tls.key)?;
            w.param("tls_client_cert_path", &tls.cert)?;
            w.param("tls_cert_path", &tls.ca_bundle)?;
        }
    }
    if let Some(path) = &store.shared_key_path {
        w.open("security", "")?;
        w.param("self_hostname", NODE_NAME)?;
        w.param(
            "shared_key",
            format!("\"#{{File.open('{path}') do |f| f.readline end.rstrip}}\""),
        )?;
        w.close("security")?;
    }
    w.open("server", "")?;
    w.param("host", &store.endpoint.host)?;
    w.param("port", store.endpoint.port)?;
    w.close("server")
}

fn write_syslog(w: &mut ConfWriter, store: &Store, id: &str) -> fmt::Result {
    w.param("@type", "remote_syslog")?;
    w.param("@id", id)?;
    w.param("host", &store.endpoint.host)?;
    w.param("port", store.endpoint.port)?;
    w.param("hostname", NODE_NAME)?;
    w.param("facility", "user")?;
    w.param("severity", "debug")?;
    match store.endpoint.scheme.as_str() {
        "udp" => w.param("protocol", "udp")?,
        _ => w.param("protocol", "tcp")?,
    }
    if store.endpoint.is_tls() {
        w.param("tls", true)?;
        if let Some(tls) = &store.tls {
            w.param("ca_file", &tls.ca_bundle)?;
        }
    }
    Ok(())
}

fn write_buffer(w: &mut ConfWriter, path: &str, tuning: &BufferTuning) -> fmt::Result {
    w.open("buffer", "")?;
    w.param("@type", "file")?;
    w.param("path", path)?;
    w.param("flush_mode", "interval")?;
    w.param("flush_interval", &tuning.flush_interval)?;
    w.param("flush_thread_count", tuning.flush_thread_count)?;
    w.param("flush_at_shutdown", tuning.flush_at_shutdown)?;
    w.param("retry_type", "exponential_backoff")?;
    w.param("retry_wait", "1s")?;
    w.param("retry_max_interval", &tuning.retry_max_interval)?;
    w.param("retry_forever", true)?;
    w.param("queued_chunks_limit_size", tuning.queued_chunks_limit_size)?;
    w.param("chunk_limit_size", &tuning.chunk_limit_size)?;
    w.param("overflow_action", tuning.overflow_action)?;
    w.close("buffer")
}
