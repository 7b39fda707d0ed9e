//! Spotify Web API client.
//!
//! Blocking implementation of [`StreamingService`]. Requests are paced to at
//! most one per [`MIN_REQUEST_INTERVAL`] and retried on 429/5xx/network errors
//! with `Retry-After` or exponential backoff, so rate limits never reach the
//! discovery algorithms. A 401 fails immediately.
//!
//! Obtaining the bearer token is out of scope; pass one in via
//! `SPOTIFY_ACCESS_TOKEN`.

use crate::error::{DiscoverError, Result};
use crate::service::{ArtistRef, RawTrack, StreamingService};
use crate::track::AudioFeatures;
use log::{debug, trace, warn};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::RETRY_AFTER;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::sync::{Mutex, OnceLock, PoisonError};
use std::time::{Duration, Instant};

pub const SPOTIFY_API_BASE: &str = "https://api.spotify.com/v1";

const MIN_REQUEST_INTERVAL: Duration = Duration::from_millis(100);
const MAX_ATTEMPTS: u32 = 5;
const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(30);
const SAVED_PAGE_SIZE: usize = 50;
const PLAYLIST_PAGE_SIZE: usize = 100;
/// Upper bound on ids per "add tracks" request.
const ADD_TRACKS_CHUNK: usize = 100;

pub struct SpotifyClient {
    client: Client,
    base_url: String,
    token: String,
    market: String,
    last_request: Mutex<Instant>,
    initial_backoff: Duration,
    user_id: OnceLock<String>,
}

#[derive(Deserialize)]
struct Page<T> {
    items: Vec<T>,
    next: Option<String>,
}

#[derive(Deserialize)]
struct TrackItem {
    track: Option<ApiTrack>,
}

#[derive(Deserialize)]
struct ApiTrack {
    id: Option<String>,
    name: String,
    #[serde(default)]
    artists: Vec<ApiArtist>,
    #[serde(default)]
    popularity: Option<u32>,
}

#[derive(Deserialize)]
struct ApiArtist {
    id: Option<String>,
    name: String,
}

#[derive(Deserialize)]
struct RelatedArtistsResponse {
    artists: Vec<ApiArtist>,
}

#[derive(Deserialize)]
struct TopTracksResponse {
    tracks: Vec<ApiTrack>,
}

#[derive(Deserialize)]
struct CurrentUser {
    id: String,
}

#[derive(Deserialize)]
struct CreatedPlaylist {
    id: String,
}

impl ApiTrack {
    /// Local files and removed items come back without an id.
    fn into_raw(self) -> Option<RawTrack> {
        let id = self.id?;
        Some(RawTrack {
            id,
            name: self.name,
            artists: self
                .artists
                .into_iter()
                .filter_map(|a| Some(ArtistRef { id: a.id?, name: a.name }))
                .collect(),
            popularity: self.popularity.unwrap_or(0),
        })
    }
}

/// What to do with a response status.
#[derive(Debug, PartialEq, Eq)]
enum Verdict {
    Accept,
    Retry(Option<Duration>),
    Unauthorized,
    Refuse,
}

fn judge_status(status: u16, retry_after: Option<Duration>) -> Verdict {
    match status {
        200..=299 => Verdict::Accept,
        401 => Verdict::Unauthorized,
        429 => Verdict::Retry(retry_after),
        500..=599 => Verdict::Retry(None),
        _ => Verdict::Refuse,
    }
}

/// Exponential backoff for the given (1-based) attempt, capped at [`MAX_BACKOFF`].
fn backoff_delay(initial: Duration, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    initial.saturating_mul(factor).min(MAX_BACKOFF)
}

/// How long to wait before the next attempt. A server `Retry-After` is
/// honoured as given; only our own backoff is capped.
fn retry_wait(hint: Option<Duration>, initial: Duration, attempt: u32) -> Duration {
    hint.unwrap_or_else(|| backoff_delay(initial, attempt))
}

fn retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn transport_error(err: &reqwest::Error) -> DiscoverError {
    DiscoverError::Transient(err.to_string())
}

impl SpotifyClient {
    pub fn new(token: &str, market: &str) -> Result<Self> {
        Self::with_base_url(token, market, SPOTIFY_API_BASE)
    }

    pub fn with_base_url(token: &str, market: &str, base_url: &str) -> Result<Self> {
        if token.trim().is_empty() {
            return Err(DiscoverError::InvalidConfig(
                "missing Spotify access token (set SPOTIFY_ACCESS_TOKEN)".into(),
            ));
        }

        let client = Client::builder()
            .user_agent(concat!("discoverdaily/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| transport_error(&e))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.trim().to_string(),
            market: market.to_string(),
            last_request: Mutex::new(Instant::now().checked_sub(MIN_REQUEST_INTERVAL).unwrap_or_else(Instant::now)),
            initial_backoff: INITIAL_BACKOFF,
            user_id: OnceLock::new(),
        })
    }

    /// Starting delay of the exponential backoff between retries.
    #[must_use]
    pub fn with_initial_backoff(mut self, initial: Duration) -> Self {
        self.initial_backoff = initial;
        self
    }

    fn pace(&self) {
        let mut last = self.last_request.lock().unwrap_or_else(PoisonError::into_inner);
        let elapsed = last.elapsed();
        if elapsed < MIN_REQUEST_INTERVAL {
            std::thread::sleep(MIN_REQUEST_INTERVAL - elapsed);
        }
        *last = Instant::now();
    }

    /// Sends the request built by `build`, retrying transient failures.
    fn send(&self, build: impl Fn() -> RequestBuilder) -> Result<Response> {
        let mut rate_limited = false;
        let mut last_failure = String::new();

        for attempt in 1..=MAX_ATTEMPTS {
            self.pace();

            let wait = match build().bearer_auth(&self.token).send() {
                Ok(response) => {
                    let status = response.status();
                    match judge_status(status.as_u16(), retry_after(&response)) {
                        Verdict::Accept => return Ok(response),
                        Verdict::Unauthorized => {
                            let body = response.text().unwrap_or_default();
                            return Err(DiscoverError::Unauthorized(body));
                        }
                        Verdict::Refuse => {
                            let message = response.text().unwrap_or_default();
                            return Err(DiscoverError::Service {
                                status: status.as_u16(),
                                message,
                            });
                        }
                        Verdict::Retry(hint) => {
                            rate_limited = status.as_u16() == 429;
                            last_failure = format!("HTTP {status}");
                            retry_wait(hint, self.initial_backoff, attempt)
                        }
                    }
                }
                Err(e) => {
                    rate_limited = false;
                    last_failure = e.to_string();
                    backoff_delay(self.initial_backoff, attempt)
                }
            };

            if attempt < MAX_ATTEMPTS {
                warn!(
                    "Spotify request failed ({last_failure}), retrying in {:.1}s (attempt {attempt}/{MAX_ATTEMPTS})",
                    wait.as_secs_f64()
                );
                std::thread::sleep(wait);
            }
        }

        if rate_limited {
            Err(DiscoverError::RateLimited { attempts: MAX_ATTEMPTS })
        } else {
            Err(DiscoverError::Transient(last_failure))
        }
    }

    fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        trace!("GET {url}");
        self.send(|| self.client.get(url))?
            .json()
            .map_err(|e| transport_error(&e))
    }

    fn paged_tracks(&self, first_url: String) -> Result<Vec<RawTrack>> {
        let mut tracks = Vec::new();
        let mut next = Some(first_url);

        while let Some(url) = next {
            let page: Page<TrackItem> = self.get_json(&url)?;
            tracks.extend(
                page.items
                    .into_iter()
                    .filter_map(|item| item.track.and_then(ApiTrack::into_raw)),
            );
            next = page.next;
        }

        Ok(tracks)
    }

    fn current_user_id(&self) -> Result<String> {
        if let Some(id) = self.user_id.get() {
            return Ok(id.clone());
        }
        let user: CurrentUser = self.get_json(&format!("{}/me", self.base_url))?;
        debug!("Authenticated as Spotify user {}", user.id);
        Ok(self.user_id.get_or_init(|| user.id).clone())
    }
}

impl StreamingService for SpotifyClient {
    fn saved_tracks(&self) -> Result<Vec<RawTrack>> {
        let tracks = self.paged_tracks(format!(
            "{}/me/tracks?limit={SAVED_PAGE_SIZE}&offset=0",
            self.base_url
        ))?;
        debug!("Fetched {} saved tracks", tracks.len());
        Ok(tracks)
    }

    fn playlist_tracks(&self, playlist_id: &str) -> Result<Vec<RawTrack>> {
        let tracks = self.paged_tracks(format!(
            "{}/playlists/{playlist_id}/tracks?limit={PLAYLIST_PAGE_SIZE}&offset=0",
            self.base_url
        ))?;
        debug!("Fetched {} tracks from playlist {playlist_id}", tracks.len());
        Ok(tracks)
    }

    fn audio_features(&self, track_id: &str) -> Result<Option<AudioFeatures>> {
        let url = format!("{}/audio-features/{track_id}", self.base_url);
        match self.get_json::<Option<AudioFeatures>>(&url) {
            Ok(features) => Ok(features),
            Err(DiscoverError::Service { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn related_artists(&self, artist_id: &str, limit: usize) -> Result<Vec<String>> {
        let response: RelatedArtistsResponse = self.get_json(&format!(
            "{}/artists/{artist_id}/related-artists",
            self.base_url
        ))?;
        Ok(response
            .artists
            .into_iter()
            .filter_map(|artist| artist.id)
            .take(limit)
            .collect())
    }

    fn artist_top_tracks(&self, artist_id: &str, limit: usize) -> Result<Vec<RawTrack>> {
        let response: TopTracksResponse = self.get_json(&format!(
            "{}/artists/{artist_id}/top-tracks?market={}",
            self.base_url, self.market
        ))?;
        Ok(response
            .tracks
            .into_iter()
            .filter_map(ApiTrack::into_raw)
            .take(limit)
            .collect())
    }

    fn create_playlist(&self, title: &str, description: &str) -> Result<String> {
        let user_id = self.current_user_id()?;
        let url = format!("{}/users/{user_id}/playlists", self.base_url);
        let body = json!({ "name": title, "description": description, "public": false });

        let created: CreatedPlaylist = self
            .send(|| self.client.post(&url).json(&body))?
            .json()
            .map_err(|e| transport_error(&e))?;
        debug!("Created playlist {} ({title})", created.id);
        Ok(created.id)
    }

    fn add_tracks_to_playlist(&self, playlist_id: &str, track_ids: &[String]) -> Result<()> {
        let url = format!("{}/playlists/{playlist_id}/tracks", self.base_url);
        for chunk in track_ids.chunks(ADD_TRACKS_CHUNK) {
            let uris: Vec<String> = chunk.iter().map(|id| format!("spotify:track:{id}")).collect();
            let body = json!({ "uris": uris });
            self.send(|| self.client.post(&url).json(&body))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_verdicts() {
        assert_eq!(judge_status(200, None), Verdict::Accept);
        assert_eq!(judge_status(201, None), Verdict::Accept);
        assert_eq!(judge_status(401, None), Verdict::Unauthorized);
        assert_eq!(
            judge_status(429, Some(Duration::from_secs(3))),
            Verdict::Retry(Some(Duration::from_secs(3)))
        );
        assert_eq!(judge_status(503, None), Verdict::Retry(None));
        assert_eq!(judge_status(404, None), Verdict::Refuse);
        assert_eq!(judge_status(403, None), Verdict::Refuse);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        assert_eq!(backoff_delay(INITIAL_BACKOFF, 1), Duration::from_millis(500));
        assert_eq!(backoff_delay(INITIAL_BACKOFF, 2), Duration::from_millis(1000));
        assert_eq!(backoff_delay(INITIAL_BACKOFF, 3), Duration::from_millis(2000));
        assert_eq!(backoff_delay(INITIAL_BACKOFF, 10), MAX_BACKOFF);
        assert_eq!(backoff_delay(INITIAL_BACKOFF, 40), MAX_BACKOFF);
    }

    #[test]
    fn test_long_retry_after_is_not_capped() {
        let asked = Duration::from_secs(60);
        assert_eq!(retry_wait(Some(asked), INITIAL_BACKOFF, 1), asked);
        assert_eq!(retry_wait(Some(Duration::from_secs(35)), INITIAL_BACKOFF, 4), Duration::from_secs(35));
        assert_eq!(retry_wait(None, INITIAL_BACKOFF, 10), MAX_BACKOFF);
    }

    #[test]
    fn test_playlist_page_skips_local_and_missing_tracks() {
        let body = r#"{
            "items": [
                {"track": {"id": "abc", "name": "Real", "popularity": 40,
                           "artists": [{"id": "ar1", "name": "Band"}, {"id": null, "name": "Local"}]}},
                {"track": {"id": null, "name": "Local file", "artists": []}},
                {"track": null}
            ],
            "next": null,
            "total": 3
        }"#;

        let page: Page<TrackItem> = serde_json::from_str(body).expect("page parses");
        assert!(page.next.is_none());

        let tracks: Vec<RawTrack> = page
            .items
            .into_iter()
            .filter_map(|item| item.track.and_then(ApiTrack::into_raw))
            .collect();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].id, "abc");
        assert_eq!(tracks[0].popularity, 40);
        assert_eq!(tracks[0].artists, vec![ArtistRef { id: "ar1".into(), name: "Band".into() }]);
    }

    #[test]
    fn test_audio_features_payload_parses() {
        let body = r#"{
            "danceability": 0.735, "energy": 0.578, "key": 5, "loudness": -11.84,
            "mode": 0, "speechiness": 0.0461, "acousticness": 0.514,
            "instrumentalness": 0.0902, "liveness": 0.159, "valence": 0.636,
            "tempo": 98.002, "type": "audio_features", "id": "06AKEBrKUckW0KREUWRnvT",
            "duration_ms": 255349, "time_signature": 4
        }"#;

        let features: Option<AudioFeatures> = serde_json::from_str(body).expect("features parse");
        let features = features.expect("features present");
        assert_eq!(features.key, 5);
        assert_eq!(features.duration_ms, 255_349);
        assert!((features.tempo - 98.002).abs() < f64::EPSILON);

        let missing: Option<AudioFeatures> = serde_json::from_str("null").expect("null parses");
        assert!(missing.is_none());
    }

    #[test]
    fn test_related_and_top_track_payloads() {
        let related: RelatedArtistsResponse = serde_json::from_str(
            r#"{"artists": [{"id": "r1", "name": "A"}, {"id": "r2", "name": "B"}]}"#,
        )
        .expect("related parses");
        assert_eq!(related.artists.len(), 2);

        let top: TopTracksResponse = serde_json::from_str(
            r#"{"tracks": [{"id": "t1", "name": "Hit", "popularity": 90,
                            "artists": [{"id": "r1", "name": "A"}]}]}"#,
        )
        .expect("top tracks parse");
        let raw = top.tracks.into_iter().next().and_then(ApiTrack::into_raw).expect("track");
        assert_eq!(raw.name, "Hit");
    }

    #[test]
    fn test_client_requires_token() {
        assert!(matches!(
            SpotifyClient::new("   ", "US"),
            Err(DiscoverError::InvalidConfig(_))
        ));
        assert!(SpotifyClient::new("token", "US").is_ok());
    }

    mod http {
        use super::*;
        use httpmock::prelude::*;
        use serde_json::json;

        fn client(server: &MockServer) -> SpotifyClient {
            SpotifyClient::with_base_url("tok", "SE", &server.base_url())
                .expect("client builds")
                .with_initial_backoff(Duration::from_millis(1))
        }

        fn track(id: &str) -> serde_json::Value {
            json!({ "track": { "id": id, "name": id, "popularity": 10,
                               "artists": [{ "id": "ar", "name": "Artist" }] } })
        }

        #[test]
        fn test_saved_tracks_follow_next_links() {
            let server = MockServer::start();
            let second = server.mock(|when, then| {
                when.method(GET).path("/me/tracks").query_param("offset", "50");
                then.status(200).json_body(json!({ "items": [track("t3")], "next": null }));
            });
            let first = server.mock(|when, then| {
                when.method(GET).path("/me/tracks").query_param("offset", "0");
                then.status(200).json_body(json!({
                    "items": [track("t1"), { "track": null }, track("t2")],
                    "next": server.url("/me/tracks?limit=50&offset=50"),
                }));
            });

            let tracks = client(&server).saved_tracks().expect("tracks fetched");
            let ids: Vec<&str> = tracks.iter().map(|t| t.id.as_str()).collect();
            assert_eq!(ids, ["t1", "t2", "t3"]);
            first.assert_hits(1);
            second.assert_hits(1);
        }

        #[test]
        fn test_missing_audio_features_are_none() {
            let server = MockServer::start();
            server.mock(|when, then| {
                when.method(GET).path("/audio-features/gone");
                then.status(404).body("not found");
            });
            server.mock(|when, then| {
                when.method(GET).path("/audio-features/null");
                then.status(200).body("null");
            });

            let client = client(&server);
            assert!(client.audio_features("gone").expect("404 is not an error").is_none());
            assert!(client.audio_features("null").expect("null parses").is_none());
        }

        #[test]
        fn test_unauthorized_is_not_retried() {
            let server = MockServer::start();
            let mock = server.mock(|when, then| {
                when.method(GET).path("/artists/a1/related-artists");
                then.status(401).body("token expired");
            });

            let err = client(&server).related_artists("a1", 5).expect_err("401 fails");
            assert!(matches!(err, DiscoverError::Unauthorized(ref body) if body == "token expired"));
            mock.assert_hits(1);
        }

        #[test]
        fn test_other_client_errors_are_refused() {
            let server = MockServer::start();
            let mock = server.mock(|when, then| {
                when.method(GET).path("/artists/a1/top-tracks").query_param("market", "SE");
                then.status(403).body("forbidden");
            });

            let err = client(&server).artist_top_tracks("a1", 5).expect_err("403 fails");
            assert!(matches!(err, DiscoverError::Service { status: 403, .. }));
            mock.assert_hits(1);
        }

        #[test]
        fn test_rate_limit_exhausts_attempts() {
            let server = MockServer::start();
            let mock = server.mock(|when, then| {
                when.method(GET).path("/artists/a1/related-artists");
                then.status(429);
            });

            let err = client(&server).related_artists("a1", 5).expect_err("still limited");
            assert!(matches!(err, DiscoverError::RateLimited { attempts: MAX_ATTEMPTS }));
            assert!(err.is_retryable());
            mock.assert_hits(MAX_ATTEMPTS as usize);
        }

        #[test]
        fn test_server_errors_exhaust_to_transient() {
            let server = MockServer::start();
            let mock = server.mock(|when, then| {
                when.method(GET).path("/artists/a1/related-artists");
                then.status(503);
            });

            let err = client(&server).related_artists("a1", 5).expect_err("still down");
            assert!(matches!(err, DiscoverError::Transient(ref msg) if msg.contains("503")));
            mock.assert_hits(MAX_ATTEMPTS as usize);
        }

        #[test]
        fn test_retry_after_is_waited_out() {
            let server = MockServer::start();
            let mut limited = server.mock(|when, then| {
                when.method(GET).path("/artists/a1/related-artists");
                then.status(429).header("Retry-After", "1");
            });
            let client = client(&server);

            let started = Instant::now();
            let related = std::thread::scope(|scope| {
                let request = scope.spawn(|| client.related_artists("a1", 5));
                while limited.hits() == 0 {
                    std::thread::sleep(Duration::from_millis(5));
                }
                limited.delete();
                server.mock(|when, then| {
                    when.method(GET).path("/artists/a1/related-artists");
                    then.status(200)
                        .json_body(json!({ "artists": [{ "id": "r1", "name": "R" }, { "id": "r2", "name": "S" }] }));
                });
                request.join().expect("request thread")
            });

            assert_eq!(related.expect("retried after the wait"), ["r1", "r2"]);
            assert!(started.elapsed() >= Duration::from_secs(1));
        }

        #[test]
        fn test_user_id_is_fetched_once() {
            let server = MockServer::start();
            let me = server.mock(|when, then| {
                when.method(GET).path("/me");
                then.status(200).json_body(json!({ "id": "u1" }));
            });
            let create = server.mock(|when, then| {
                when.method(POST).path("/users/u1/playlists").body_contains("Daily 10_16");
                then.status(201).json_body(json!({ "id": "p1" }));
            });

            let client = client(&server);
            assert_eq!(client.create_playlist("Daily 10_16", "Generated").expect("created"), "p1");
            assert_eq!(client.create_playlist("Daily 10_16", "Generated").expect("created"), "p1");
            me.assert_hits(1);
            create.assert_hits(2);
        }

        #[test]
        fn test_tracks_are_added_in_chunks_of_100() {
            let server = MockServer::start();
            let chunk = |first: &str| {
                let needle = format!("\"spotify:track:{first}\"");
                server.mock(move |when, then| {
                    when.method(POST).path("/playlists/p1/tracks").body_contains(&needle);
                    then.status(201).json_body(json!({ "snapshot_id": "s" }));
                })
            };
            let chunks = [chunk("t0"), chunk("t100"), chunk("t200")];

            let ids: Vec<String> = (0..250).map(|i| format!("t{i}")).collect();
            client(&server).add_tracks_to_playlist("p1", &ids).expect("tracks added");
            for mock in &chunks {
                mock.assert_hits(1);
            }
        }
    }
}
