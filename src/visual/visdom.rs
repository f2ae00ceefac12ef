//! Visdom dashboard client
//!
//! Talks to a Visdom server through its `POST /events` endpoint: images are
//! sent as base64 PNG data URLs, loss series as line traces. Nothing is read
//! back.

use base64::Engine;
use reqwest::blocking::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tch::Tensor;

use super::{encode_png, make_grid, VisualSink};
use crate::error::{Error, Result};
use crate::training::LossHistory;

/// Visdom sink
pub struct VisdomSink {
    client: Client,
    url: String,
    env: String,
}

impl VisdomSink {
    /// Create a client for `{server}:{port}` posting into `env`
    pub fn new(server: &str, port: u16, env: &str) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(5)).build()?;

        Ok(Self {
            client,
            url: format!("{}:{}/events", server.trim_end_matches('/'), port),
            env: env.to_string(),
        })
    }

    fn post(&self, body: &Value) -> Result<()> {
        let response = self.client.post(&self.url).json(body).send()?;

        if !response.status().is_success() {
            return Err(Error::Sink(format!(
                "Visdom request failed: {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// Event showing one PNG in a window
pub fn image_event(env: &str, window: &str, png: &[u8], caption: &str) -> Value {
    let src = format!(
        "data:image/png;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(png)
    );
    json!({
        "eid": env,
        "win": window,
        "data": [{
            "content": { "src": src, "caption": caption },
            "type": "image",
        }],
        "opts": { "title": window },
    })
}

/// Event drawing one loss series as a line
pub fn line_event(env: &str, window: &str, values: &[f64]) -> Value {
    let x: Vec<usize> = (1..=values.len()).collect();
    json!({
        "eid": env,
        "win": window,
        "data": [{
            "x": x,
            "y": values,
            "name": window,
            "type": "scatter",
            "mode": "lines",
        }],
        "layout": { "title": window, "xaxis": { "title": "step" } },
        "opts": { "title": window },
    })
}

impl VisualSink for VisdomSink {
    fn name(&self) -> &'static str {
        "visdom"
    }

    fn images(&mut self, window: &str, images: &Tensor, step: u64) -> Result<()> {
        let nrow = (images.size()[0] as f64).sqrt().ceil() as i64;
        let png = encode_png(&make_grid(images, nrow, 2)?)?;
        let caption = format!("step {}", step);
        self.post(&image_event(&self.env, window, &png, &caption))
    }

    fn losses(&mut self, history: &LossHistory, _step: u64) -> Result<()> {
        for name in history.series_names() {
            if let Some(values) = history.get(name) {
                // NaN is not valid JSON
                let values: Vec<f64> = values
                    .iter()
                    .map(|v| if v.is_finite() { *v } else { 0.0 })
                    .collect();
                self.post(&line_event(&self.env, name, &values))?;
            }
        }
        Ok(())
    }
}
