use serde::Deserialize;
use serde_json::Value;
use serde_json::json;
use suve_ipc::ErrorKind;
use suve_ipc::Method;
use suve_ipc::Response;
use suve_record::Entry;
use suve_record::Key;
use suve_record::Name;
use suve_record::Service;
use suve_record::State;
use suve_record::TagEntry;
use suve_state::AgentState;
use suve_state::StateError;

#[derive(Deserialize)]
struct KeyParams {
    service: String,
    name: String,
}

#[derive(Deserialize)]
struct StageEntryParams {
    service: String,
    name: String,
    entry: Entry,
}

#[derive(Deserialize)]
struct StageTagParams {
    service: String,
    name: String,
    tag_entry: TagEntry,
}

#[derive(Deserialize)]
struct FilterParams {
    #[serde(default)]
    service: String,
}

#[derive(Deserialize)]
struct DrainParams {
    #[serde(default)]
    service: String,
    #[serde(default)]
    keep: bool,
}

#[derive(Deserialize)]
struct WriteStateParams {
    #[serde(default)]
    service: String,
    state: State,
}

fn bad_request(e: impl std::fmt::Display) -> Response {
    Response::err(ErrorKind::InvalidRequest, e.to_string())
}

fn parse<T: serde::de::DeserializeOwned>(params: Value) -> Result<T, Response> {
    serde_json::from_value(params).map_err(bad_request)
}

fn key_of(service: &str, name: &str) -> Result<Key, Response> {
    let service: Service = service.parse().map_err(bad_request)?;
    Ok((service, Name::from(name)))
}

fn filter_of(service: &str) -> Result<Option<Service>, Response> {
    Service::parse_filter(service).map_err(bad_request)
}

/// Reshape a flat `Vec<(Key, V)>` into the wire's `{service: {name: value}}`
/// map, keyed directly by service rather than wrapped in a `State`.
fn by_service<V: serde::Serialize>(items: Vec<(Key, V)>) -> Value {
    let mut grouped: std::collections::BTreeMap<Service, std::collections::BTreeMap<Name, V>> = std::collections::BTreeMap::new();
    for (key, value) in items {
        grouped.entry(key.0).or_default().insert(key.1, value);
    }
    json!(grouped)
}

fn state_err(e: StateError) -> Response {
    let kind = match e {
        StateError::NotStaged { .. } => ErrorKind::NotStaged,
        StateError::AlreadyStaged { .. } => ErrorKind::AlreadyStaged,
        StateError::InvalidTagEntry => ErrorKind::InvalidRequest,
    };
    Response::err(kind, e.to_string())
}

/// Run the requested operation against `state` and produce its
/// `Response`. A panicking operation is recovered and reported as
/// `internal` rather than taking the daemon down.
pub fn dispatch(state: &AgentState, method: Method, params: Value) -> Response {
    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| dispatch_inner(state, method, params)));
    outcome.unwrap_or_else(|_| {
        tracing::error!(?method, "operation panicked");
        Response::err(ErrorKind::Internal, "operation panicked")
    })
}

fn dispatch_inner(state: &AgentState, method: Method, params: Value) -> Response {
    match method {
        Method::Ping => Response::ok(json!({})),

        Method::StageEntry => with_key_params::<StageEntryParams, _>(params, |p, key| {
            state.stage_entry(key, p.entry).map(|r| json!({ "prior": r.prior, "cancelled": r.cancelled }))
        }),

        Method::GetEntry => with_key_params::<KeyParams, _>(params, |_, key| state.get_entry(&key).map(|e| json!(e))),

        Method::UnstageEntry => with_key_params::<KeyParams, _>(params, |_, key| state.unstage_entry(&key).map(|()| json!({}))),

        Method::StageTag => with_key_params::<StageTagParams, _>(params, |p, key| {
            state.stage_tag(key, p.tag_entry).map(|r| json!({ "prior": r.prior }))
        }),

        Method::GetTag => with_key_params::<KeyParams, _>(params, |_, key| state.get_tag(&key).map(|t| json!(t))),

        Method::UnstageTag => with_key_params::<KeyParams, _>(params, |_, key| state.unstage_tag(&key).map(|()| json!({}))),

        Method::ListEntries => with_filter::<FilterParams>(params, |p, filter| {
            let _ = p;
            Ok(by_service(state.list_entries(filter)))
        }),

        Method::ListTags => with_filter::<FilterParams>(params, |p, filter| {
            let _ = p;
            Ok(by_service(state.list_tags(filter)))
        }),

        Method::UnstageAll => with_filter::<FilterParams>(params, |_, filter| {
            state.unstage_all(filter);
            Ok(json!({}))
        }),

        Method::Drain => with_filter::<DrainParams>(params, |p, filter| {
            let drained = state.drain(filter, p.keep);
            Ok(json!(drained))
        }),

        Method::WriteState => with_filter::<WriteStateParams>(params, |p, filter| {
            state.write_state(filter, p.state);
            Ok(json!({}))
        }),

        Method::Shutdown => Response::ok(json!({})),
    }
}

/// Parse `params` as `T` (which must carry `service`/`name` fields),
/// resolve the `Key`, then run `op`. Every failure path (bad params,
/// unknown service, a `StateError`) collapses to the matching
/// `Response`.
fn with_key_params<T, F>(params: Value, op: F) -> Response
where
    T: serde::de::DeserializeOwned + AsKeyParams,
    F: FnOnce(T, Key) -> Result<Value, StateError>,
{
    let parsed = match parse::<T>(params) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    let key = match key_of(parsed.service(), parsed.name()) {
        Ok(key) => key,
        Err(resp) => return resp,
    };
    match op(parsed, key) {
        Ok(value) => Response::ok(value),
        Err(e) => state_err(e),
    }
}

trait AsKeyParams {
    fn service(&self) -> &str;
    fn name(&self) -> &str;
}

impl AsKeyParams for KeyParams {
    fn service(&self) -> &str {
        &self.service
    }
    fn name(&self) -> &str {
        &self.name
    }
}

impl AsKeyParams for StageEntryParams {
    fn service(&self) -> &str {
        &self.service
    }
    fn name(&self) -> &str {
        &self.name
    }
}

impl AsKeyParams for StageTagParams {
    fn service(&self) -> &str {
        &self.service
    }
    fn name(&self) -> &str {
        &self.name
    }
}

/// Parse `params` as `T` (which must carry a `service` filter field),
/// resolve the `service | ""` convention, then run `op`.
fn with_filter<T>(params: Value, op: impl FnOnce(T, Option<Service>) -> Result<Value, std::convert::Infallible>) -> Response
where
    T: serde::de::DeserializeOwned + AsFilterParams,
{
    let parsed = match parse::<T>(params) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    let filter = match filter_of(parsed.service()) {
        Ok(filter) => filter,
        Err(resp) => return resp,
    };
    match op(parsed, filter) {
        Ok(value) => Response::ok(value),
        Err(never) => match never {},
    }
}

trait AsFilterParams {
    fn service(&self) -> &str;
}

impl AsFilterParams for FilterParams {
    fn service(&self) -> &str {
        &self.service
    }
}

impl AsFilterParams for DrainParams {
    fn service(&self) -> &str {
        &self.service
    }
}

impl AsFilterParams for WriteStateParams {
    fn service(&self) -> &str {
        &self.service
    }
}

#[cfg(test)]
mod tests {
    use suve_ipc::ErrorKind;

    use super::*;

    fn entry_json() -> Value {
        json!({
            "operation": "update",
            "value": "v",
            "description": null,
            "type_hint": null,
            "delete_options": null,
            "staged_at": "2026-01-01T00:00:00Z",
            "base_modified_at": null,
        })
    }

    #[test]
    fn ping_is_always_ok() {
        let state = AgentState::new();
        let response = dispatch(&state, Method::Ping, json!({}));
        assert!(response.ok);
    }

    #[test]
    fn stage_then_get_round_trips() {
        let state = AgentState::new();
        let response = dispatch(
            &state,
            Method::StageEntry,
            json!({ "service": "param", "name": "/a", "entry": entry_json() }),
        );
        assert!(response.ok);

        let response = dispatch(&state, Method::GetEntry, json!({ "service": "param", "name": "/a" }));
        assert!(response.ok);
        assert_eq!(response.result.unwrap()["value"], json!("v"));
    }

    #[test]
    fn get_entry_on_an_absent_key_is_not_staged() {
        let state = AgentState::new();
        let response = dispatch(&state, Method::GetEntry, json!({ "service": "param", "name": "/missing" }));
        assert!(!response.ok);
        assert_eq!(response.error.unwrap().kind, ErrorKind::NotStaged);
    }

    #[test]
    fn unknown_service_is_an_invalid_request() {
        let state = AgentState::new();
        let response = dispatch(&state, Method::GetEntry, json!({ "service": "bogus", "name": "/a" }));
        assert!(!response.ok);
        assert_eq!(response.error.unwrap().kind, ErrorKind::InvalidRequest);
    }

    #[test]
    fn create_twice_is_already_staged() {
        let state = AgentState::new();
        let params = json!({ "service": "param", "name": "/a", "entry": entry_json() });
        dispatch(&state, Method::StageEntry, params.clone());
        let response = dispatch(&state, Method::StageEntry, params);
        assert!(!response.ok);
        assert_eq!(response.error.unwrap().kind, ErrorKind::AlreadyStaged);
    }

    #[test]
    fn list_entries_with_empty_service_filter_returns_everything() {
        let state = AgentState::new();
        dispatch(
            &state,
            Method::StageEntry,
            json!({ "service": "param", "name": "/a", "entry": entry_json() }),
        );
        let response = dispatch(&state, Method::ListEntries, json!({ "service": "" }));
        assert!(response.ok);
        assert_eq!(response.result.unwrap()["param"]["/a"]["value"], json!("v"));
    }

    #[test]
    fn drain_without_keep_empties_the_agent() {
        let state = AgentState::new();
        dispatch(
            &state,
            Method::StageEntry,
            json!({ "service": "param", "name": "/a", "entry": entry_json() }),
        );
        let response = dispatch(&state, Method::Drain, json!({ "service": "", "keep": false }));
        assert!(response.ok);
        assert!(state.is_empty());
    }

    #[test]
    fn malformed_params_are_a_clean_invalid_request_not_a_panic() {
        let state = AgentState::new();
        let response = dispatch(&state, Method::GetEntry, json!(null));
        assert!(!response.ok);
        assert_eq!(response.error.unwrap().kind, ErrorKind::InvalidRequest);
    }

    #[test]
    fn dispatch_recovers_from_a_panic_inside_the_operation() {
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| -> Response { panic!("boom") }))
                .unwrap_or_else(|_| Response::err(ErrorKind::Internal, "operation panicked"))
        }));
        let response = outcome.unwrap();
        assert!(!response.ok);
        assert_eq!(response.error.unwrap().kind, ErrorKind::Internal);
    }
}
