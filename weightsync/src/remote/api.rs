use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, COOKIE},
    Client, Response,
};
use serde::Deserialize;
use std::time::Duration;
use url::Url;

use crate::config::GarminConfig;
use crate::error::{Result, SyncError};
use crate::models::{BodyComposition, RawWeightEntry, UserIdentity, UserProfile};

use super::WeightSource;

const PROFILE_PATH: &[&str] = &[
    "modern",
    "proxy",
    "userprofile-service",
    "userprofile",
    "personal-information",
];
const WEIGHT_RANGE_PATH: &[&str] = &["modern", "proxy", "weight-service", "weight", "dateRange"];
const SESSION_PAGE_PATH: &[&str] = &["modern", ""];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WeightRangeResponse {
    #[serde(default)]
    date_weight_list: Vec<DateWeight>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DateWeight {
    calendar_date: String,
    weight: f64,
    date: i64,
    source_type: Option<String>,
    bmi: Option<f64>,
    body_fat: Option<f64>,
    body_water: Option<f64>,
    bone_mass: Option<f64>,
    muscle_mass: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileResponse {
    user_info: Option<UserInfo>,
    birth_date: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserInfo {
    birth_date: Option<String>,
}

impl From<DateWeight> for RawWeightEntry {
    fn from(wire: DateWeight) -> Self {
        let composition = BodyComposition {
            bmi: wire.bmi,
            body_water_pct: wire.body_water,
            body_fat_pct: wire.body_fat,
            bone_mass_grams: wire.bone_mass.map(|grams| grams.round() as i64),
            muscle_mass_grams: wire.muscle_mass.map(|grams| grams.round() as i64),
        };

        RawWeightEntry {
            calendar_date: wire.calendar_date,
            weight_grams: wire.weight.round() as i64,
            epoch_millis: wire.date,
            source_type: wire.source_type,
            body_composition: (!composition.is_empty()).then_some(composition),
        }
    }
}

/// HTTP client for the Garmin Connect proxy endpoints used by the web app.
#[derive(Clone)]
pub struct GarminConnectClient {
    client: Client,
    base_url: Url,
}

impl GarminConnectClient {
    pub fn new(config: &GarminConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        // Garmin's proxy rejects calls that do not look like they come from the web app.
        headers.insert(HeaderName::from_static("nk"), HeaderValue::from_static("NT"));

        if let Some(ref cookie) = config.session_cookie {
            headers.insert(
                COOKIE,
                HeaderValue::from_str(cookie)
                    .map_err(|e| SyncError::Validation(format!("Invalid session cookie: {e}")))?,
            );
        }

        if let Some(ref token) = config.auth_token {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {token}"))
                    .map_err(|e| SyncError::Validation(format!("Invalid auth token header: {e}")))?,
            );
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()?;

        Ok(Self { client, base_url })
    }

    /// Text of the logged-in landing page, used for identity discovery.
    pub async fn fetch_session_page(&self) -> Result<String> {
        let url = self.endpoint(SESSION_PAGE_PATH)?;
        let resp = self
            .client
            .get(url)
            .header(ACCEPT, "text/html")
            .send()
            .await?;
        let resp = Self::check_status(resp).await?;
        Ok(resp.text().await?)
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        let base = url.to_string();
        url.path_segments_mut()
            .map_err(|_| SyncError::Validation(format!("Base URL cannot be a base: {base}")))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn check_status(resp: Response) -> Result<Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let body = resp.text().await.unwrap_or_default();
        Err(SyncError::RemoteStatus {
            status: status.as_u16(),
            body,
        })
    }
}

fn parse_birth_date(raw: &str) -> Result<NaiveDate> {
    // Some accounts report a full timestamp; only the date part matters.
    let date_part = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .map_err(|e| SyncError::ProfileUnavailable(format!("Unparsable birth date '{raw}': {e}")))
}

#[async_trait]
impl WeightSource for GarminConnectClient {
    async fn fetch_profile(&self, user: &UserIdentity) -> Result<UserProfile> {
        let mut url = self.endpoint(PROFILE_PATH)?;
        url.path_segments_mut()
            .map_err(|_| SyncError::Validation("Base URL cannot be a base".to_string()))?
            .push(&user.display_name);

        let resp = Self::check_status(self.client.get(url).send().await?).await?;
        let body: ProfileResponse = resp.json().await?;

        let raw_birth_date = body
            .user_info
            .and_then(|info| info.birth_date)
            .or(body.birth_date)
            .ok_or_else(|| SyncError::ProfileUnavailable("Profile has no birth date".to_string()))?;

        Ok(UserProfile {
            display_name: user.display_name.clone(),
            birth_date: parse_birth_date(&raw_birth_date)?,
        })
    }

    async fn fetch_weight_range(
        &self,
        _user: &UserIdentity,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<RawWeightEntry>> {
        let url = self.endpoint(WEIGHT_RANGE_PATH)?;
        let start = start.format("%Y-%m-%d").to_string();
        let end = end.format("%Y-%m-%d").to_string();

        let resp = self
            .client
            .get(url)
            .query(&[("startDate", start.as_str()), ("endDate", end.as_str())])
            .send()
            .await?;
        let body: WeightRangeResponse = Self::check_status(resp).await?.json().await?;

        Ok(body
            .date_weight_list
            .into_iter()
            .map(RawWeightEntry::from)
            .collect())
    }
}
