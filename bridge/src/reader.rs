use crate::config::WebConfig;
use crate::debug_dump::DebugDump;
use crate::errors::{ConfigError, ReadError};
use crate::extract::{check_shape, extract, Rule};
use crate::metrics::READ_FAILURES_TOTAL;
use crate::model::{value_text, Device, DeviceReading, TelemetryPayload};
use crate::session::Session;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE, ORIGIN, REFERER};
use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

const X_REQUESTED_WITH: HeaderName = HeaderName::from_static("x-requested-with");
const REQUIRED_FIELDS: [&str; 3] = ["para", "last", "unit"];

#[async_trait]
pub trait DeviceSource: Send + Sync {
    async fn read(&self, session: &Session, device: &Device) -> Result<DeviceReading, ReadError>;
}

/// Reads one device through the portal's AJAX telemetry endpoint, sending
/// the same headers the portal's own page script sends.
pub struct DeviceReader {
    data_url: Url,
    headers: HeaderMap,
    dump: DebugDump,
}

impl DeviceReader {
    pub fn new(web: &WebConfig, dump: DebugDump) -> Result<Self, ConfigError> {
        let header = |key: &'static str, value: &str| {
            HeaderValue::from_str(value).map_err(|e| ConfigError::InvalidHeader {
                key,
                value: value.to_string(),
                reason: e.to_string(),
            })
        };

        let mut headers = HeaderMap::new();
        headers.insert(X_REQUESTED_WITH, HeaderValue::from_static("XMLHttpRequest"));
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded; charset=UTF-8"),
        );
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/json, text/javascript, */*; q=0.01"),
        );
        headers.insert(REFERER, header("HOME_URL", web.home_url.as_str())?);
        headers.insert(ORIGIN, header("SITE_ORIGIN", &web.origin)?);

        Ok(Self {
            data_url: web.data_url.clone(),
            headers,
            dump,
        })
    }

    /// Posts the device id and returns whatever the portal answered, error
    /// statuses included, so the body can still be dumped.
    async fn fetch(
        &self,
        session: &Session,
        device: &Device,
    ) -> Result<(StatusCode, String), ReadError> {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("id", &device.id)
            .finish();

        debug!("Calling AJAX endpoint {}", self.data_url);
        let response = session
            .client()
            .post(self.data_url.clone())
            .headers(self.headers.clone())
            .body(body)
            .send()
            .await?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-")
            .to_string();
        let status = response.status();
        let text = response.text().await?;
        debug!(
            "Response status {}, content-type {}, {} chars",
            status,
            content_type,
            text.len()
        );
        Ok((status, text))
    }
}

#[async_trait]
impl DeviceSource for DeviceReader {
    async fn read(&self, session: &Session, device: &Device) -> Result<DeviceReading, ReadError> {
        info!("Requesting data for {} (ID: {})", device.label, device.id);

        let result = match self.fetch(session, device).await {
            Ok((status, body)) => {
                self.dump.record(&device.label, &body).await;
                if status.is_success() {
                    parse_reading(device, &body)
                } else {
                    Err(ReadError::Status { status, body })
                }
            }
            Err(e) => Err(e),
        };

        if let Err(e) = &result {
            READ_FAILURES_TOTAL.inc();
            warn!("Read failed for {}: {}", device.label, e);
            if let Some(body) = e.body() {
                debug!("First 500 chars: {}", body.chars().take(500).collect::<String>());
            }
        }
        result
    }
}

/// Turns a raw telemetry response into a reading for `device`.
pub fn parse_reading(device: &Device, body: &str) -> Result<DeviceReading, ReadError> {
    let value: Value = serde_json::from_str(body).map_err(|source| ReadError::NotJson {
        source,
        body: body.to_string(),
    })?;

    let malformed = |reason: String| ReadError::MalformedPayload {
        reason,
        body: body.to_string(),
    };

    let keys: Vec<String> = match value.as_object() {
        Some(object) => object.keys().cloned().collect(),
        None => return Err(malformed("response is not a JSON object".to_string())),
    };
    debug!("Received JSON data with keys {:?}", keys);
    if let Some(field) = REQUIRED_FIELDS.iter().find(|f| !keys.iter().any(|k| k == *f)) {
        return Err(malformed(format!("missing {:?}, keys are {:?}", field, keys)));
    }

    let payload: TelemetryPayload =
        serde_json::from_value(value).map_err(|e| malformed(e.to_string()))?;
    check_shape(&payload).map_err(malformed)?;

    for i in 0..payload.len() {
        let key = payload
            .key
            .as_ref()
            .and_then(|keys| keys.get(i))
            .map(value_text)
            .unwrap_or_default();
        debug!(
            "  {}: {} = {} {} [{}]",
            i,
            payload.para[i],
            payload.value_at(i).unwrap_or_default(),
            payload.unit_at(i),
            key
        );
    }

    let found = extract(&payload).ok_or_else(|| ReadError::NoReading {
        parameters: payload.para.clone(),
    })?;
    match found.rule {
        Rule::Keyword => info!(
            "Found {} = {} {} for {} (index {})",
            found.parameter, found.value, found.unit, device.label, found.index
        ),
        Rule::Fallback => info!(
            "Using {} = {} {} for {} (first non-temp/humidity value)",
            found.parameter, found.value, found.unit, device.label
        ),
    }

    Ok(DeviceReading {
        device: device.clone(),
        parameter: found.parameter,
        value: found.value,
        unit: found.unit,
        taken_at: Utc::now(),
    })
}
