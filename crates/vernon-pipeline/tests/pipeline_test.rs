//! Pipeline runs against in-test collaborators: failing search, slow or failing
//! generators, and a booking desk that records what the user could see mid-booking.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use vernon_core::{
    BookingConfirmation, BookingRequest, BookingService, BusyPolicy, Named, Origin,
    PipelineConfig, ProviderChain, SearchOptions, SearchProvider, SearchResult,
    SharedConversation, SimulatedBookings, StaticVenueDirectory, TextGenerator, Utterance,
    VernonError, VernonResult,
};
use vernon_pipeline::{
    MessagePipeline, MockGenerator, Services, BOOKING_PLACEHOLDER, BUSY_REPLY,
};

struct DownSearch(&'static str);

impl Named for DownSearch {
    fn name(&self) -> &str {
        self.0
    }
}

#[async_trait]
impl SearchProvider for DownSearch {
    async fn search(&self, _query: &str, _options: &SearchOptions) -> VernonResult<SearchResult> {
        Err(VernonError::provider(self.0, "connection refused"))
    }
}

struct DownGenerator;

impl Named for DownGenerator {
    fn name(&self) -> &str {
        "down"
    }
}

#[async_trait]
impl TextGenerator for DownGenerator {
    async fn generate(&self, _prompt: &str, _prior: &[Utterance]) -> VernonResult<String> {
        Err(VernonError::provider("down", "503"))
    }
}

/// Answers after a delay, echoing the prompt and recording the prior context it saw.
struct SlowGenerator {
    delay: Duration,
    priors: Mutex<Vec<Vec<String>>>,
}

impl SlowGenerator {
    fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            priors: Mutex::new(Vec::new()),
        })
    }

    fn priors(&self) -> Vec<Vec<String>> {
        self.priors.lock().unwrap().clone()
    }
}

impl Named for SlowGenerator {
    fn name(&self) -> &str {
        "slow"
    }
}

#[async_trait]
impl TextGenerator for SlowGenerator {
    async fn generate(&self, prompt: &str, prior: &[Utterance]) -> VernonResult<String> {
        self.priors
            .lock()
            .unwrap()
            .push(prior.iter().map(|u| u.text.clone()).collect());
        tokio::time::sleep(self.delay).await;
        Ok(format!("answer to {}", prompt))
    }
}

/// Books through the simulated desk, noting the last visible message at call time.
struct PeekingBookings {
    conversation: SharedConversation,
    seen: Mutex<Vec<String>>,
    inner: SimulatedBookings,
}

#[async_trait]
impl BookingService for PeekingBookings {
    async fn book(&self, request: &BookingRequest) -> VernonResult<BookingConfirmation> {
        if let Some(last) = self.conversation.snapshot().messages.last() {
            self.seen.lock().unwrap().push(last.text.clone());
        }
        self.inner.book(request).await
    }
}

fn failing_search() -> ProviderChain<dyn SearchProvider> {
    ProviderChain::new(vec![
        Arc::new(DownSearch("perplexity")) as Arc<dyn SearchProvider>,
        Arc::new(DownSearch("openrouter-search")) as Arc<dyn SearchProvider>,
    ])
}

fn build(
    generators: Vec<Arc<dyn TextGenerator>>,
    bookings: Arc<dyn BookingService>,
    config: PipelineConfig,
    convo: &SharedConversation,
) -> MessagePipeline {
    let services = Services::new(
        ProviderChain::new(generators),
        failing_search(),
        Arc::new(StaticVenueDirectory::with_sample_data()),
        bookings,
        &config,
    )
    .unwrap();
    MessagePipeline::new(&config, services, convo.clone()).unwrap()
}

fn offline(convo: &SharedConversation) -> MessagePipeline {
    build(
        vec![Arc::new(DownGenerator)],
        Arc::new(SimulatedBookings::new()),
        PipelineConfig::default(),
        convo,
    )
}

fn assistant_texts(convo: &SharedConversation) -> Vec<String> {
    convo
        .snapshot()
        .messages
        .into_iter()
        .filter(|m| m.origin == Origin::Assistant)
        .map(|m| m.text)
        .collect()
}

#[tokio::test]
async fn booking_placeholder_is_replaced_by_one_confirmation() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let convo = SharedConversation::new();
    let bookings = Arc::new(PeekingBookings {
        conversation: convo.clone(),
        seen: Mutex::new(Vec::new()),
        inner: SimulatedBookings::new(),
    });
    let pipeline = build(
        vec![Arc::new(DownGenerator)],
        bookings.clone(),
        PipelineConfig::default(),
        &convo,
    );

    let result = pipeline
        .process("book a table for 4 at 7pm at the steakhouse")
        .await;

    assert!(result.success);
    assert_eq!(*bookings.seen.lock().unwrap(), vec![BOOKING_PLACEHOLDER.to_string()]);

    let replies = assistant_texts(&convo);
    assert_eq!(replies.len(), 1);
    let reply = &replies[0];
    assert!(reply.contains("table for 4"), "{}", reply);
    assert!(reply.contains("The Steakhouse at Edgewater"), "{}", reply);
    assert!(reply.contains("Confirmation code: TBL-"), "{}", reply);
    assert_eq!(convo.message_count(), 2);
}

#[tokio::test]
async fn miami_events_fall_back_to_directory_when_search_is_down() {
    let convo = SharedConversation::new();
    let pipeline = offline(&convo);

    let result = pipeline.process("what's happening in Miami tonight").await;

    let reply = result.response.unwrap();
    assert!(!reply.trim().is_empty());
    assert!(reply.contains("Miami"));
    assert!(reply.contains("Ball & Chain"));
    assert_eq!(assistant_texts(&convo), vec![reply]);
}

#[tokio::test]
async fn every_accepted_input_gets_exactly_one_reply() {
    let convo = SharedConversation::new();
    let pipeline = offline(&convo);
    let longest = "x".repeat(5000);
    let inputs = [
        "hello there",
        "book a table",
        "next page",
        "stand up comedy in Austin",
        "find a quiet rooftop bar with good cocktails and live music that is open late on sunday",
        longest.as_str(),
    ];

    for (i, input) in inputs.iter().enumerate() {
        let result = pipeline.process(input).await;
        assert!(result.handled);
        let replies = assistant_texts(&convo);
        assert_eq!(replies.len(), i + 1, "after {:?}", input);
        assert!(!replies[i].trim().is_empty());
        assert_eq!(result.response.as_deref(), Some(replies[i].as_str()));
    }
}

#[tokio::test]
async fn failed_booking_does_not_fall_through() {
    let convo = SharedConversation::new();
    let pipeline = offline(&convo);

    let result = pipeline.process("book a table").await;
    assert!(!result.success);
    assert!(result.handled);
    assert!(result.response.unwrap().contains("Which venue"));
    assert_eq!(assistant_texts(&convo).len(), 1);
}

#[tokio::test]
async fn invalid_input_adds_nothing() {
    let convo = SharedConversation::new();
    let pipeline = offline(&convo);
    let too_long = "y".repeat(5001);

    for input in ["", "   \n", too_long.as_str()] {
        let result = pipeline.process(input).await;
        assert!(result.response.is_none());
        assert!(result.error.is_some());
    }
    assert_eq!(convo.message_count(), 0);
    assert!(!convo.is_busy());
}

#[tokio::test]
async fn paging_through_directory_results() {
    let convo = SharedConversation::new();
    let pipeline = offline(&convo);

    let first = pipeline.process("show me venues in Miami").await;
    assert!(first.response.unwrap().contains("(page 1 of 2)"));

    let next = pipeline.process("next page").await;
    let next = next.response.unwrap();
    assert!(next.contains("(page 2 of 2)"), "{}", next);
    assert!(next.contains("Laugh Factory Miami"));

    let back = pipeline.process("previous page").await;
    assert!(back.response.unwrap().contains("(page 1 of 2)"));
    assert_eq!(pipeline.pages().get("venues"), Some(&1));

    let again = pipeline.process("previous page").await;
    assert!(again.response.unwrap().contains("(page 1 of 2)"));
}

#[tokio::test]
async fn paging_past_the_end_steps_back_from_the_last_page() {
    let convo = SharedConversation::new();
    let pipeline = offline(&convo);

    pipeline.process("show me venues in Miami").await;
    for _ in 0..3 {
        let next = pipeline.process("next page").await.response.unwrap();
        assert!(next.contains("(page 2 of 2)"), "{}", next);
    }
    assert_eq!(pipeline.pages().get("venues"), Some(&2));

    let back = pipeline.process("previous page").await.response.unwrap();
    assert!(back.contains("(page 1 of 2)"), "{}", back);
}

#[tokio::test]
async fn mock_generator_answers_small_talk() {
    let convo = SharedConversation::new();
    let pipeline = build(
        vec![Arc::new(DownGenerator), Arc::new(MockGenerator)],
        Arc::new(SimulatedBookings::new()),
        PipelineConfig::default(),
        &convo,
    );
    let result = pipeline.process("tell me a joke").await;
    assert!(result.response.unwrap().starts_with("[Mock reply]"));
}

#[tokio::test(start_paused = true)]
async fn queued_utterances_are_answered_in_order() {
    let convo = SharedConversation::new();
    let generator = SlowGenerator::new(Duration::from_secs(2));
    let pipeline = build(
        vec![generator.clone() as Arc<dyn TextGenerator>],
        Arc::new(SimulatedBookings::new()),
        PipelineConfig::default(),
        &convo,
    );

    let (a, b) = tokio::join!(pipeline.process("tell me a joke"), async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        pipeline.process("tell me another joke").await
    });

    assert_eq!(a.response.as_deref(), Some("answer to tell me a joke"));
    assert_eq!(b.response.as_deref(), Some("answer to tell me another joke"));
    assert_eq!(
        assistant_texts(&convo),
        vec!["answer to tell me a joke", "answer to tell me another joke"]
    );
    assert!(!convo.is_busy());

    // The queued utterance waits its turn: no interleaving, and it sees the first reply.
    let transcript: Vec<String> = convo.snapshot().messages.into_iter().map(|m| m.text).collect();
    assert_eq!(
        transcript,
        vec![
            "tell me a joke",
            "answer to tell me a joke",
            "tell me another joke",
            "answer to tell me another joke",
        ]
    );
    assert_eq!(
        generator.priors(),
        vec![
            Vec::<String>::new(),
            vec!["tell me a joke".to_string(), "answer to tell me a joke".to_string()],
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn drop_policy_turns_second_utterance_away_without_touching_transcript() {
    let convo = SharedConversation::new();
    let config = PipelineConfig {
        busy_policy: BusyPolicy::Drop,
        ..PipelineConfig::default()
    };
    let pipeline = build(
        vec![SlowGenerator::new(Duration::from_secs(2)) as Arc<dyn TextGenerator>],
        Arc::new(SimulatedBookings::new()),
        config,
        &convo,
    );

    let (a, b) = tokio::join!(pipeline.process("tell me a joke"), async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        pipeline.process("tell me another joke").await
    });

    assert_eq!(a.response.as_deref(), Some("answer to tell me a joke"));
    assert!(b.is_busy());
    assert_eq!(b.response.as_deref(), Some(BUSY_REPLY));
    let transcript: Vec<String> = convo.snapshot().messages.into_iter().map(|m| m.text).collect();
    assert_eq!(transcript, vec!["tell me a joke", "answer to tell me a joke"]);
}
