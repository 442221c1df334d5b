#![deny(warnings)]

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context;
use clap::Parser;
use http::{HeaderValue, header};
use httpprom::{DEFAULT_BODY_LIMIT, HandlerOptions, MetricsConfig, ServeMux, new_server};
use prometheus_client::{encoding::text::encode, registry::Registry};

/// 带请求指标的示例 HTTP 服务
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Param {
    #[arg(long, short, value_name = "port", default_value = "4000")]
    port: u16,
    #[arg(long, value_name = "FILE", help = "YAML metrics config, flags below override it")]
    config: Option<PathBuf>,
    #[arg(long, help = "label requests by method")]
    method: bool,
    #[arg(long, help = "label completed requests by status code")]
    code: bool,
    #[arg(long, value_name = "NAMESPACE", help = "metric name prefix")]
    namespace: Option<String>,
    #[arg(long = "const-label", value_name = "KEY=VALUE", value_parser = parse_label)]
    const_labels: Vec<(String, String)>,
    #[arg(long, value_name = "BYTES", default_value_t = DEFAULT_BODY_LIMIT)]
    body_limit: usize,
}

pub(crate) static PARAM: std::sync::LazyLock<Param> = std::sync::LazyLock::new(Param::parse);

fn parse_label(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got {s:?}")),
    }
}

fn metrics_config(param: &Param) -> anyhow::Result<MetricsConfig> {
    let mut config = match &param.config {
        Some(path) => MetricsConfig::from_yaml_file(path).with_context(|| format!("load {}", path.display()))?,
        None => MetricsConfig::new(),
    };
    config.method |= param.method;
    config.code |= param.code;
    if let Some(namespace) = &param.namespace {
        config.namespace = Some(namespace.clone());
    }
    config.const_labels.extend(param.const_labels.iter().cloned());
    config.validate()?;
    Ok(config)
}

fn build_mux(config: MetricsConfig) -> ServeMux {
    let mut registry = Registry::default();
    let mut mux = ServeMux::new(config);
    mux.register(&mut registry);
    let registry = Arc::new(registry);

    mux.handle_fn(
        "/",
        |w, req| {
            w.header().insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
            let _ = w.write(format!("hello from {}\n", req.uri().path()).as_bytes());
        },
        HandlerOptions::new(),
    );
    mux.handle_fn(
        "/stream",
        |w, _| {
            w.header().insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
            let closed = w.as_close_notifier().map(|notifier| notifier.close_notify());
            for i in 0..5 {
                if closed.as_ref().is_some_and(|closed| *closed.borrow()) {
                    log::info!("client went away after {i} ticks");
                    return;
                }
                if w.write(format!("tick {i}\n").as_bytes()).is_err() {
                    return;
                }
                if let Some(flusher) = w.as_flusher() {
                    let _ = flusher.flush();
                }
                std::thread::sleep(Duration::from_millis(500));
            }
        },
        HandlerOptions::new().with_name("stream"),
    );
    mux.handle_fn(
        "/metrics",
        move |w, _| {
            let mut buffer = String::new();
            if let Err(e) = encode(&mut buffer, &registry) {
                log::error!("Failed to encode metrics: {e:?}");
                w.write_header(500);
                return;
            }
            w.header().insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/openmetrics-text; version=1.0.0; charset=utf-8"),
            );
            let _ = w.write(buffer.as_bytes());
        },
        HandlerOptions::new().with_name("metrics"),
    );
    mux
}

#[tokio::main]
pub async fn main() -> anyhow::Result<()> {
    httpprom::logging::init(env!("CARGO_CRATE_NAME")).map_err(|e| anyhow::anyhow!(e))?;
    let config = metrics_config(&PARAM)?;
    log::info!("metrics config: {config:?}");
    let mux = build_mux(config);

    let (server, shutdown_tx) = new_server(PARAM.port, mux.into_service().with_body_limit(PARAM.body_limit));
    tokio::spawn(async move {
        if let Err(e) = httpprom::wait_signal().await {
            log::error!("wait signal: {e}");
        }
        let _ = shutdown_tx.send(()).await;
    });
    server.run().await.context("serve")?;
    Ok(())
}
