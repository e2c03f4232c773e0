//! Request director state machine
//!
//! Owns the full lifecycle of one gateway stream: parse the request body,
//! admit, schedule onto a pod, rewrite the outbound request, observe the
//! streamed response for TTFT/TPOT, feed the online latency predictor, and
//! splice telemetry into the rewritten stream.
//!
//! Each stream is driven by exactly one task; all state transitions for a
//! request are serial. Predictor failures never fail the request: they
//! degrade to zero-valued observations and a log line.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use llm_inference_director_core::{
    seed_from_request_id, Clock, Criticality, DirectorError, InferenceModel, RequestContext,
    Result, SchedulingRequest, Timestamp, TokenSampler, DEFAULT_SAMPLING_MEAN, MAX_SAMPLED_TOKENS,
};
use llm_inference_director_predictor::{
    Prediction, PredictionRequest, Predictor, TrainingEntry,
};
use llm_inference_director_scheduling::{
    random_weighted_draw, subset_filtered_pods, AdmissionController, Datastore, Scheduler,
};

use crate::metrics::ServiceMetrics;
use crate::protocol::{
    find_header, BodyMutation, CommonResponse, Header, HeaderMutation, Metadata,
    ProcessingRequest, ProcessingResponse,
};
use crate::sse;

/// Header telling the gateway which backend endpoint to use
pub const DESTINATION_ENDPOINT_HEADER: &str = "x-gateway-destination-endpoint";

/// Inbound header carrying the request id
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Marker added to response headers on the way back out
pub const RESPONSE_HEADERS_MARKER: &str = "x-went-into-resp-headers";

/// Marker added to response trailers on the way back out
pub const RESPONSE_TRAILERS_MARKER: &str = "x-went-into-resp-trailers";

/// Default per-chunk byte limit for rebuilt bodies
pub const DEFAULT_BODY_BYTE_LIMIT: usize = 64 * 1024;

/// Director tunables
#[derive(Debug, Clone)]
pub struct DirectorSettings {
    /// Mean token gap between sampled predictions
    pub sampling_mean: f64,
    /// Cap on sampled predictions per request
    pub max_sampled_tokens: usize,
    /// Per-chunk byte limit for bodies sent back to the gateway
    pub body_byte_limit: usize,
}

impl Default for DirectorSettings {
    fn default() -> Self {
        Self {
            sampling_mean: DEFAULT_SAMPLING_MEAN,
            max_sampled_tokens: MAX_SAMPLED_TOKENS,
            body_byte_limit: DEFAULT_BODY_BYTE_LIMIT,
        }
    }
}

/// Shared director: one per process, cheap to clone behind an [`Arc`]
pub struct Director {
    datastore: Arc<dyn Datastore>,
    scheduler: Arc<dyn Scheduler>,
    admission: AdmissionController,
    predictor: Arc<dyn Predictor>,
    metrics: Arc<ServiceMetrics>,
    clock: Clock,
    settings: DirectorSettings,
}

impl Director {
    /// Create a director over its collaborators
    pub fn new(
        datastore: Arc<dyn Datastore>,
        scheduler: Arc<dyn Scheduler>,
        admission: AdmissionController,
        predictor: Arc<dyn Predictor>,
        metrics: Arc<ServiceMetrics>,
        settings: DirectorSettings,
    ) -> Self {
        Self {
            datastore,
            scheduler,
            admission,
            predictor,
            metrics,
            clock: Clock::new(),
            settings,
        }
    }

    /// Open a session for one gateway stream.
    ///
    /// The returned session owns the request context until the stream
    /// closes; `cancel` is the stream's ambient cancellation token.
    pub fn open_stream(self: &Arc<Self>, cancel: CancellationToken) -> StreamSession {
        let received_at = self.clock.now();
        StreamSession {
            director: Arc::clone(self),
            ctx: RequestContext::new(received_at),
            request_headers: Vec::new(),
            metadata: Metadata::new(),
            request_body: String::new(),
            cancel,
        }
    }

    /// Service metrics recorded by this director
    pub fn metrics(&self) -> &Arc<ServiceMetrics> {
        &self.metrics
    }
}

/// Per-stream state machine. Exclusively owned by the stream's task; holds
/// the request context for its whole lifetime.
pub struct StreamSession {
    director: Arc<Director>,
    ctx: RequestContext,
    request_headers: Vec<Header>,
    metadata: Metadata,
    request_body: String,
    cancel: CancellationToken,
}

impl StreamSession {
    /// The request context, including after a failure, so the outer handler
    /// can emit diagnostics
    pub fn context(&self) -> &RequestContext {
        &self.ctx
    }

    /// Process one inbound frame and produce the frames to send back.
    ///
    /// Body answers may span several frames to respect the per-chunk byte
    /// limit. A cancelled stream produces no further frames.
    pub async fn handle(&mut self, frame: ProcessingRequest) -> Result<Vec<ProcessingResponse>> {
        if self.cancel.is_cancelled() {
            debug!(request_id = %self.ctx.request_id, "stream cancelled, dropping frame");
            return Ok(Vec::new());
        }

        match frame {
            ProcessingRequest::RequestHeaders {
                headers, metadata, ..
            } => Ok(self.on_request_headers(headers, metadata)),
            ProcessingRequest::RequestBody {
                body,
                end_of_stream,
            } => self.on_request_body(body, end_of_stream).await,
            ProcessingRequest::ResponseHeaders { headers, .. } => {
                self.on_response_headers(headers).await
            }
            ProcessingRequest::ResponseBody {
                body,
                end_of_stream,
            } => self.on_response_body(body, end_of_stream).await,
            ProcessingRequest::ResponseTrailers { trailers } => {
                Ok(self.on_response_trailers(trailers))
            }
        }
    }

    fn on_request_headers(
        &mut self,
        headers: Vec<Header>,
        metadata: Metadata,
    ) -> Vec<ProcessingResponse> {
        self.ctx.request_id = find_header(&headers, REQUEST_ID_HEADER)
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        self.request_headers = headers;
        self.metadata = metadata;
        debug!(request_id = %self.ctx.request_id, "request headers received");
        vec![ProcessingResponse::request_headers_ack()]
    }

    async fn on_request_body(
        &mut self,
        body: String,
        end_of_stream: bool,
    ) -> Result<Vec<ProcessingResponse>> {
        self.request_body.push_str(&body);
        if !end_of_stream {
            return Ok(vec![ProcessingResponse::request_body_ack()]);
        }

        match self.route_request().await {
            Ok(responses) => Ok(responses),
            Err(err) => {
                self.director.metrics.observe_rejected(&err);
                Err(err)
            }
        }
    }

    /// Parse → resolve → admit → filter → schedule → prepare, run once the
    /// full request body has arrived.
    async fn route_request(&mut self) -> Result<Vec<ProcessingResponse>> {
        let payload: serde_json::Value =
            serde_json::from_str(&self.request_body).map_err(|e| {
                DirectorError::bad_request(format!("request body is not valid JSON: {e}"))
            })?;
        let model = payload
            .get("model")
            .and_then(|m| m.as_str())
            .filter(|m| !m.is_empty())
            .ok_or_else(|| DirectorError::bad_request("request body is missing the model field"))?
            .to_string();
        self.ctx.prompt = extract_prompt(&payload)?;
        self.ctx.model = model.clone();

        let registration = self.director.datastore.model_get(&model).unwrap_or_else(|| {
            debug!(%model, "model not registered, treating as sheddable");
            InferenceModel::sheddable(&model)
        });
        self.ctx.criticality = registration.criticality.unwrap_or(Criticality::Standard);

        let resolved = if registration.target_models.is_empty() {
            model.clone()
        } else {
            random_weighted_draw(&registration, seed_from_request_id(&self.ctx.request_id))
                .ok_or_else(|| {
                    DirectorError::bad_configuration(format!(
                        "no usable target models for {model}"
                    ))
                })?
        };
        if resolved.is_empty() {
            return Err(DirectorError::bad_configuration(format!(
                "model {model} resolved to an empty target name"
            )));
        }
        self.ctx.resolved_target_model = resolved.clone();

        self.director.admission.admit(self.ctx.criticality)?;

        let candidates = subset_filtered_pods(&self.metadata, self.director.datastore.as_ref());
        if candidates.is_empty() {
            return Err(DirectorError::service_unavailable(
                "no candidate pods after endpoint filtering",
            ));
        }

        let scheduling_request = SchedulingRequest {
            request_id: self.ctx.request_id.clone(),
            target_model: resolved.clone(),
            prompt: self.ctx.prompt.clone(),
            headers: self
                .request_headers
                .iter()
                .map(|h| (h.key.clone(), h.value.clone()))
                .collect(),
        };
        self.ctx.scheduling_request = Some(scheduling_request.clone());

        let result = self
            .director
            .scheduler
            .schedule(&scheduling_request, candidates)
            .await
            .map_err(|e| {
                DirectorError::resource_exhausted(format!("failed to schedule request: {e}"))
            })?;
        let primary = result.primary().ok_or_else(|| {
            DirectorError::internal(format!(
                "scheduling result has no '{}' profile",
                result.primary_profile_name
            ))
        })?;
        let target_pod = primary.target_pod.clone();

        let pool = self.director.datastore.pool_get()?;
        let endpoint = format!("{}:{}", target_pod.address, pool.target_port);
        info!(
            request_id = %self.ctx.request_id,
            model = %self.ctx.model,
            target_model = %resolved,
            endpoint = %endpoint,
            criticality = %self.ctx.criticality,
            "request scheduled"
        );

        self.ctx.last_seen_metrics = Some(target_pod.metrics.clone());
        self.ctx.target_pod = Some(target_pod);
        self.ctx.target_endpoint = Some(endpoint.clone());
        self.ctx.scheduling_result = Some(result);
        self.director.metrics.observe_routed();

        let mut payload = payload;
        if let Some(object) = payload.as_object_mut() {
            object.insert(
                "model".to_string(),
                serde_json::Value::String(resolved.clone()),
            );
        }
        let mutated = serde_json::to_string(&payload).map_err(|e| {
            DirectorError::internal(format!("failed to serialize rewritten body: {e}"))
        })?;

        let chunks = sse::chunk_body(&mutated, self.director.settings.body_byte_limit);
        let last = chunks.len() - 1;
        let responses = chunks
            .into_iter()
            .enumerate()
            .map(|(i, chunk)| {
                let header_mutation = (i == 0).then(|| HeaderMutation {
                    set_headers: vec![Header::new(DESTINATION_ENDPOINT_HEADER, &endpoint)],
                    remove_headers: vec!["content-length".to_string()],
                });
                ProcessingResponse::RequestBody {
                    response: CommonResponse {
                        header_mutation,
                        body_mutation: Some(BodyMutation {
                            body: chunk,
                            end_of_stream: i == last,
                        }),
                    },
                }
            })
            .collect();
        Ok(responses)
    }

    async fn on_response_headers(
        &mut self,
        headers: Vec<Header>,
    ) -> Result<Vec<ProcessingResponse>> {
        self.ctx.model_server_streaming = headers.iter().any(|h| {
            h.key.eq_ignore_ascii_case("content-type") && h.value.contains("text/event-stream")
        });
        self.refresh_pod_metrics();

        // TTFT prediction runs exactly once per request and is never
        // sampled.
        if self.ctx.target_pod.is_some() {
            let features = self.prediction_features(0);
            self.ctx.predicted_ttft_ms = match self.predict(features).await {
                Some(prediction) => prediction.ttft_ms,
                None => 0.0,
            };
        }

        let mut set_headers = headers;
        set_headers.push(Header::new(RESPONSE_HEADERS_MARKER, "true"));
        Ok(vec![ProcessingResponse::ResponseHeaders {
            response: CommonResponse {
                header_mutation: Some(HeaderMutation {
                    set_headers,
                    remove_headers: Vec::new(),
                }),
                body_mutation: None,
            },
        }])
    }

    async fn on_response_body(
        &mut self,
        body: String,
        end_of_stream: bool,
    ) -> Result<Vec<ProcessingResponse>> {
        let limit = self.director.settings.body_byte_limit;

        if !self.ctx.model_server_streaming {
            if let Some(usage) = sse::capture_usage(&body) {
                self.ctx.usage = Some(usage);
            }
            if end_of_stream {
                if self.ctx.usage.is_none() {
                    self.ctx.usage = usage_from_json_body(&body);
                }
                self.ctx.response_complete = true;
                self.director.metrics.observe_completed(&self.ctx);
            }
            self.refresh_pod_metrics();
            return Ok(body_responses(sse::chunk_body(&body, limit), end_of_stream));
        }

        let now = self.director.clock.now();
        if body.contains(sse::DONE_SENTINEL) {
            if let Some(usage) = sse::capture_usage(&body) {
                self.ctx.usage = Some(usage);
            }
            self.ctx.response_complete = true;
            self.director.metrics.observe_completed(&self.ctx);
        } else if !body.is_empty() {
            self.observe_token(now).await;
        }

        // Metrics refresh ends every body chunk, after any prediction for
        // the chunk has run.
        self.refresh_pod_metrics();

        let rebuilt = sse::rewrite_streaming_chunk(&body, &self.ctx);
        Ok(body_responses(
            sse::chunk_body(&rebuilt, limit),
            end_of_stream,
        ))
    }

    /// Per-token bookkeeping for one streamed body chunk.
    ///
    /// Within a chunk, training submission happens before the prediction
    /// call; the caller refreshes pod metrics afterwards, so the next
    /// chunk's prediction sees metrics sampled just after this token.
    async fn observe_token(&mut self, now: Timestamp) {
        if self.ctx.generated_token_count == 0 {
            // First output token: TTFT is set exactly once, here.
            let ttft_ms = now.millis_since(self.ctx.request_received_at).max(1);
            self.ctx.ttft_ms = ttft_ms;
            self.ctx.generated_token_count = 1;
            debug!(
                request_id = %self.ctx.request_id,
                ttft_ms,
                predicted_ttft_ms = self.ctx.predicted_ttft_ms,
                "first token observed"
            );

            let features = self.prediction_features(0);
            self.submit_training(TrainingEntry::ttft(features, ttft_ms as f64))
                .await;

            // The first TPOT prediction is forced, not sampled.
            let features = self.prediction_features(1);
            let predicted = self
                .predict(features)
                .await
                .map(|p| p.tpot_ms)
                .unwrap_or(0.0);
            self.ctx.push_predicted_tpot(predicted);

            if self.ctx.token_sampler.is_none() {
                self.ctx.token_sampler = Some(TokenSampler::new(
                    &self.ctx.request_id,
                    self.director.settings.sampling_mean,
                    self.director.settings.max_sampled_tokens,
                ));
            }
        } else {
            let inter_token_ms = self
                .ctx
                .last_token_at
                .map(|t| now.millis_since(t))
                .unwrap_or(0);
            self.ctx.generated_token_count += 1;
            let count = self.ctx.generated_token_count;

            let sampled = self
                .ctx
                .token_sampler
                .as_ref()
                .map(|s| s.should_predict(count))
                .unwrap_or(false);

            // Token 2 always records an observation so the measured sequence
            // lines up with the forced first prediction.
            if count == 2 || sampled {
                self.ctx.push_tpot_observation(inter_token_ms as f64);
            }

            let features = self.prediction_features((count - 1) as i64);
            self.submit_training(TrainingEntry::tpot(
                features,
                inter_token_ms as f64,
                (count - 1) as i64,
            ))
            .await;

            if sampled {
                let features = self.prediction_features(count as i64);
                let predicted = self
                    .predict(features)
                    .await
                    .map(|p| p.tpot_ms)
                    .unwrap_or(0.0);
                self.ctx.push_predicted_tpot(predicted);
                if let Some(sampler) = self.ctx.token_sampler.as_mut() {
                    sampler.record_prediction(count);
                }
            }
        }

        self.ctx.last_token_at = Some(now);
    }

    fn on_response_trailers(&mut self, trailers: Vec<Header>) -> Vec<ProcessingResponse> {
        let mut set = trailers;
        set.push(Header::new(RESPONSE_TRAILERS_MARKER, "true"));
        debug!(
            request_id = %self.ctx.request_id,
            generated_tokens = self.ctx.generated_token_count,
            "response trailers received"
        );
        vec![ProcessingResponse::ResponseTrailers { trailers: set }]
    }

    // Re-read the target pod's metrics from the datastore. Called on
    // response headers and after every body chunk.
    fn refresh_pod_metrics(&mut self) {
        let Some(pod) = self.ctx.target_pod.as_ref() else {
            return;
        };
        let address = pod.address.clone();
        if let Some(current) = self
            .director
            .datastore
            .pod_list(&|p| p.address == address)
            .into_iter()
            .next()
        {
            self.ctx.last_seen_metrics = Some(current.metrics);
        }
    }

    fn prediction_features(&self, tokens_generated: i64) -> PredictionRequest {
        let metrics = self.ctx.last_seen_metrics.clone().unwrap_or_default();
        PredictionRequest {
            kv_cache_percentage: metrics.kv_cache_usage_percent,
            input_token_length: self.ctx.prompt.split_whitespace().count() as i64,
            num_request_waiting: metrics.waiting_queue_size as i64,
            num_request_running: metrics.running_queue_size as i64,
            num_tokens_generated: tokens_generated,
        }
    }

    // One predictor call under the stream's cancellation token. Failures
    // and cancellation both yield None; the caller records a zero.
    async fn predict(&self, features: PredictionRequest) -> Option<Prediction> {
        tokio::select! {
            _ = self.cancel.cancelled() => {
                debug!(request_id = %self.ctx.request_id, "prediction aborted by cancellation");
                None
            }
            result = self.director.predictor.predict(features) => match result {
                Ok(prediction) => Some(prediction),
                Err(error) => {
                    self.director.metrics.observe_predictor_error();
                    warn!(
                        request_id = %self.ctx.request_id,
                        %error,
                        "prediction failed, recording zero"
                    );
                    None
                }
            }
        }
    }

    // Training writes never propagate errors to the gateway.
    async fn submit_training(&self, entry: TrainingEntry) {
        tokio::select! {
            _ = self.cancel.cancelled() => {
                debug!(request_id = %self.ctx.request_id, "training submission aborted by cancellation");
            }
            result = self.director.predictor.add_training_data_bulk(vec![entry]) => {
                match result {
                    Ok(()) => self.director.metrics.observe_training_submitted(),
                    Err(error) => {
                        self.director.metrics.observe_training_error();
                        warn!(
                            request_id = %self.ctx.request_id,
                            %error,
                            "training submission failed"
                        );
                    }
                }
            }
        }
    }
}

fn extract_prompt(payload: &serde_json::Value) -> Result<String> {
    if let Some(prompt) = payload.get("prompt").and_then(|p| p.as_str()) {
        return Ok(prompt.to_string());
    }
    let messages = payload
        .get("messages")
        .and_then(|m| m.as_array())
        .ok_or_else(|| DirectorError::bad_request("request body has neither prompt nor messages"))?;
    let parts: Vec<&str> = messages
        .iter()
        .filter_map(|m| m.get("content").and_then(|c| c.as_str()))
        .collect();
    if parts.is_empty() {
        return Err(DirectorError::bad_request("messages carry no textual content"));
    }
    Ok(parts.join(" "))
}

fn usage_from_json_body(body: &str) -> Option<llm_inference_director_core::Usage> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    serde_json::from_value(value.get("usage")?.clone()).ok()
}

fn body_responses(chunks: Vec<String>, end_of_stream: bool) -> Vec<ProcessingResponse> {
    let last = chunks.len().saturating_sub(1);
    chunks
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| ProcessingResponse::ResponseBody {
            response: CommonResponse {
                header_mutation: None,
                body_mutation: Some(BodyMutation {
                    body: chunk,
                    end_of_stream: end_of_stream && i == last,
                }),
            },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_prompt_prefers_prompt_field() {
        let payload = serde_json::json!({
            "prompt": "direct prompt",
            "messages": [{"role": "user", "content": "ignored"}],
        });
        assert_eq!(extract_prompt(&payload).unwrap(), "direct prompt");
    }

    #[test]
    fn test_extract_prompt_joins_message_content() {
        let payload = serde_json::json!({
            "messages": [
                {"role": "system", "content": "be brief"},
                {"role": "user", "content": "hello world"},
            ],
        });
        assert_eq!(extract_prompt(&payload).unwrap(), "be brief hello world");
    }

    #[test]
    fn test_extract_prompt_rejects_empty_messages() {
        let payload = serde_json::json!({"messages": []});
        assert!(matches!(
            extract_prompt(&payload),
            Err(DirectorError::BadRequest(_))
        ));
    }

    #[test]
    fn test_usage_from_json_body() {
        let body = r#"{"choices":[],"usage":{"prompt_tokens":1,"completion_tokens":2,"total_tokens":3}}"#;
        let usage = usage_from_json_body(body).unwrap();
        assert_eq!(usage.total_tokens, 3);
        assert!(usage_from_json_body("not json").is_none());
        assert!(usage_from_json_body("{}").is_none());
    }

    #[test]
    fn test_body_responses_marks_only_final_chunk() {
        let responses = body_responses(vec!["a".into(), "b".into()], true);
        let flags: Vec<bool> = responses
            .iter()
            .map(|r| match r {
                ProcessingResponse::ResponseBody { response } => {
                    response.body_mutation.as_ref().unwrap().end_of_stream
                }
                other => panic!("unexpected response: {other:?}"),
            })
            .collect();
        assert_eq!(flags, vec![false, true]);

        let not_final = body_responses(vec!["a".into()], false);
        match &not_final[0] {
            ProcessingResponse::ResponseBody { response } => {
                assert!(!response.body_mutation.as_ref().unwrap().end_of_stream);
            }
            other => panic!("unexpected response: {other:?}"),
        }
    }
}
