/*
 *  plugin/weather.rs
 *
 *  InfoCube - plugin driven LED matrix display
 *  (c) 2024-26 InfoCube Contributors
 *
 *  Current conditions from OpenWeatherMap
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use std::time::Duration;

use embedded_graphics::pixelcolor::Rgb888;
use log::{info, warn};
use reqwest::Client;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::runtime::Handle;

use crate::display::canvas::Canvas;
use crate::draw::{draw_message, draw_text, ERROR_RED, FONT_4X6, FONT_6X10, SKY_BLUE, WHITE};
use crate::plugin::refresh::BackgroundRefresh;
use crate::plugin::{defaults, ConfigExt, Plugin, PluginBase, PluginConfig, PluginContext, PluginError};

const OWM_URL: &str = "https://api.openweathermap.org/data/2.5/weather";
const VERSION: &str = concat!("InfoCube/", env!("CARGO_PKG_VERSION"));
const PAGE_SECS: f32 = 5.0;
const MIN_INTERVAL_SECS: u64 = 60;

const YELLOW: Rgb888 = Rgb888::new(255, 255, 0);
const PINK: Rgb888 = Rgb888::new(255, 114, 118);
const LIGHT_BLUE: Rgb888 = Rgb888::new(173, 216, 230);

#[derive(Debug, Error)]
pub enum WeatherError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("OpenWeatherMap API error: {0}")]
    Api(String),
    #[error("missing field in response: {0}")]
    MissingData(&'static str),
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeatherReport {
    pub city: String,
    pub temp: i64,
    pub temp_min: i64,
    pub temp_max: i64,
    pub description: String,
    pub humidity: i64,
    pub pressure: i64,
    pub wind_speed: f64,
}

/// What the render path sees
#[derive(Debug, Clone, PartialEq)]
pub enum WeatherState {
    Pending,
    NoApiKey,
    Ready(WeatherReport),
    Offline(String),
}

/// Pull the fields we show out of an OpenWeatherMap `weather` response
pub fn parse_report(body: &Value) -> Result<WeatherReport, WeatherError> {
    let main = body.get("main").ok_or(WeatherError::MissingData("main"))?;
    let num = |v: &Value, key: &'static str| -> Result<f64, WeatherError> {
        v.get(key).and_then(Value::as_f64).ok_or(WeatherError::MissingData(key))
    };

    Ok(WeatherReport {
        city: body.get("name").and_then(Value::as_str).unwrap_or("").to_string(),
        temp: num(main, "temp")?.round() as i64,
        temp_min: num(main, "temp_min")?.round() as i64,
        temp_max: num(main, "temp_max")?.round() as i64,
        humidity: num(main, "humidity")?.round() as i64,
        pressure: num(main, "pressure")?.round() as i64,
        description: body
            .get("weather")
            .and_then(|w| w.get(0))
            .and_then(|w| w.get("description"))
            .and_then(Value::as_str)
            .ok_or(WeatherError::MissingData("weather"))?
            .to_string(),
        wind_speed: body
            .get("wind")
            .and_then(|w| w.get("speed"))
            .and_then(Value::as_f64)
            .unwrap_or(0.0),
    })
}

async fn fetch_current(
    client: &Client,
    endpoint: &str,
    city_id: u64,
    units: &str,
    api_key: &str,
) -> Result<WeatherReport, WeatherError> {
    let response = client
        .get(endpoint)
        .query(&[("id", city_id.to_string()), ("appid", api_key.to_string()), ("units", units.to_string())])
        .send()
        .await?;
    if !response.status().is_success() {
        return Err(WeatherError::Api(format!("HTTP {}", response.status())));
    }
    let body: Value = response.json().await?;
    parse_report(&body)
}

pub struct WeatherPlugin {
    base: PluginBase,
    runtime: Handle,
    client: Client,
    api_key: String,
    refresh: Option<BackgroundRefresh<WeatherState>>,
    state: WeatherState,
    page: usize,
    page_time: f32,
}

impl WeatherPlugin {
    pub fn new(ctx: &PluginContext, overrides: PluginConfig) -> Result<Self, PluginError> {
        let runtime = ctx.runtime.clone().ok_or(PluginError::NoRuntime)?;
        let base = PluginBase::new(
            "weather",
            "Current weather conditions",
            defaults(json!({
                "city_id": 4791160,
                "units": "imperial",
                "update_interval": 3600,
                "endpoint": OWM_URL
            })),
            overrides,
        );

        let api_key = [
            base.config.get("api_key").and_then(Value::as_str).map(str::to_string),
            ctx.api_keys.get("openweathermap").and_then(Value::as_str).map(str::to_string),
            std::env::var("WEATHER_APP_ID").ok(),
        ]
        .into_iter()
        .flatten()
        .find(|k| !k.trim().is_empty())
        .unwrap_or_default();

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(10))
            .user_agent(VERSION)
            .build()
            .map_err(|e| PluginError::Setup { plugin: "weather".into(), reason: e.to_string() })?;

        Ok(Self {
            base,
            runtime,
            client,
            api_key,
            refresh: None,
            state: WeatherState::Pending,
            page: 0,
            page_time: 0.0,
        })
    }

    pub fn state(&self) -> &WeatherState {
        &self.state
    }

    fn units_label(&self) -> (&'static str, &'static str) {
        match self.config().str_or("units", "imperial") {
            "metric" => ("C", "m/s"),
            "standard" => ("K", "m/s"),
            _ => ("F", "mph"),
        }
    }

    fn render_report(&self, canvas: &mut Canvas, report: &WeatherReport) {
        let (deg, speed) = self.units_label();
        let h = canvas.height() as i32;
        let line = FONT_4X6.character_size.height as i32 + 1;

        match self.page {
            0 => {
                let _ = draw_text(canvas, &report.city, 2, 1, &FONT_6X10, WHITE);
                let temp = format!("{}{}", report.temp, deg);
                let _ = draw_text(canvas, &temp, 2, h / 2, &FONT_6X10, SKY_BLUE);
            }
            1 => {
                let desc = capitalize(&report.description);
                let _ = draw_text(canvas, &desc, 2, 1, &FONT_4X6, WHITE);
                let hi_lo = format!("Hi:{}{} Lo:{}{}", report.temp_max, deg, report.temp_min, deg);
                let _ = draw_text(canvas, &hi_lo, 2, h - 2 * line, &FONT_4X6, PINK);
                let hum = format!("Humidity: {}%", report.humidity);
                let _ = draw_text(canvas, &hum, 2, h - line, &FONT_4X6, LIGHT_BLUE);
            }
            _ => {
                let _ = draw_text(canvas, "Wind:", 2, 1, &FONT_4X6, YELLOW);
                let wind = format!("{:.1} {}", report.wind_speed, speed);
                let _ = draw_text(canvas, &wind, 2, line + 2, &FONT_6X10, WHITE);
                let press = format!("Press: {} hPa", report.pressure);
                let _ = draw_text(canvas, &press, 2, h - line, &FONT_4X6, LIGHT_BLUE);
            }
        }
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

impl Plugin for WeatherPlugin {
    fn base(&self) -> &PluginBase { &self.base }
    fn base_mut(&mut self) -> &mut PluginBase { &mut self.base }

    fn setup(&mut self) -> Result<(), PluginError> {
        self.page = 0;
        self.page_time = 0.0;

        if self.api_key.is_empty() {
            warn!("No OpenWeatherMap API key configured");
            self.state = WeatherState::NoApiKey;
            return Ok(());
        }
        if self.refresh.is_some() {
            return Ok(());
        }

        let cfg = self.config();
        let interval = Duration::from_secs(cfg.u64_or("update_interval", 3600).max(MIN_INTERVAL_SECS));
        let city_id = cfg.u64_or("city_id", 4791160);
        let units = cfg.str_or("units", "imperial").to_string();
        let endpoint = cfg.str_or("endpoint", OWM_URL).to_string();
        let client = self.client.clone();
        let api_key = self.api_key.clone();

        info!("Weather refresh every {:?} for city {}", interval, city_id);
        self.state = WeatherState::Pending;
        self.refresh = Some(BackgroundRefresh::spawn(
            &self.runtime,
            "weather",
            WeatherState::Pending,
            interval,
            move || {
                let client = client.clone();
                let endpoint = endpoint.clone();
                let units = units.clone();
                let api_key = api_key.clone();
                async move {
                    match fetch_current(&client, &endpoint, city_id, &units, &api_key).await {
                        Ok(report) => WeatherState::Ready(report),
                        Err(e) => {
                            warn!("Weather fetch failed: {}", e);
                            WeatherState::Offline(e.to_string())
                        }
                    }
                }
            },
        ));
        Ok(())
    }

    fn update(&mut self, delta: f32) {
        if let Some(refresh) = self.refresh.as_ref() {
            self.state = refresh.latest();
        }
        self.page_time += delta;
        if self.page_time >= PAGE_SECS {
            self.page_time = 0.0;
            self.page = (self.page + 1) % 3;
        }
    }

    fn render(&mut self, canvas: &mut Canvas) {
        match &self.state {
            WeatherState::Ready(report) => self.render_report(canvas, report),
            WeatherState::Pending => {
                let _ = draw_message(canvas, "Loading", SKY_BLUE);
            }
            WeatherState::NoApiKey => {
                let _ = draw_message(canvas, "No API key", ERROR_RED);
            }
            WeatherState::Offline(_) => {
                let _ = draw_message(canvas, "Weather offline", ERROR_RED);
            }
        }
    }

    fn cleanup(&mut self) {
        if let Some(mut refresh) = self.refresh.take() {
            refresh.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Value {
        json!({
            "name": "Falls Church",
            "main": { "temp": 71.6, "temp_min": 65.2, "temp_max": 75.9, "humidity": 40, "pressure": 1016 },
            "weather": [{ "description": "scattered clouds", "icon": "03d" }],
            "wind": { "speed": 4.6, "deg": 210 }
        })
    }

    fn ctx() -> PluginContext {
        let mut ctx = PluginContext::new(64, 32);
        ctx.runtime = Some(Handle::current());
        ctx
    }

    #[test]
    fn test_parse_report() {
        let report = parse_report(&sample()).unwrap();
        assert_eq!(report.city, "Falls Church");
        assert_eq!(report.temp, 72);
        assert_eq!(report.temp_max, 76);
        assert_eq!(report.description, "scattered clouds");
    }

    #[test]
    fn test_parse_report_missing_main() {
        assert!(matches!(
            parse_report(&json!({ "name": "x" })),
            Err(WeatherError::MissingData("main"))
        ));
    }

    #[test]
    fn test_requires_runtime() {
        let result = WeatherPlugin::new(&PluginContext::new(64, 32), PluginConfig::new());
        assert!(matches!(result, Err(PluginError::NoRuntime)));
    }

    #[tokio::test]
    async fn test_pages_render() {
        let mut plugin = WeatherPlugin::new(&ctx(), defaults(json!({ "api_key": "k" }))).unwrap();
        plugin.state = WeatherState::Ready(parse_report(&sample()).unwrap());
        for _ in 0..3 {
            let mut canvas = Canvas::new(64, 32);
            plugin.render(&mut canvas);
            assert!(canvas.lit_pixels() > 0);
            plugin.page_time = PAGE_SECS;
            plugin.page = (plugin.page + 1) % 3;
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_unreachable_endpoint_goes_offline() {
        let mut plugin = WeatherPlugin::new(
            &ctx(),
            defaults(json!({ "api_key": "k", "endpoint": "http://127.0.0.1:1/weather" })),
        )
        .unwrap();
        plugin.setup().unwrap();

        let mut state = WeatherState::Pending;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(50)).await;
            plugin.update(0.05);
            state = plugin.state().clone();
            if state != WeatherState::Pending {
                break;
            }
        }
        assert!(matches!(state, WeatherState::Offline(_)));

        let mut canvas = Canvas::new(64, 32);
        plugin.render(&mut canvas);
        assert!(canvas.lit_pixels() > 0);
        plugin.cleanup();
    }
}
