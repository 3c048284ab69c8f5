use crate::poem::{PoemOrigin, PoemRequest, PoemSource, RemoteError};
use futures::future::BoxFuture;
use futures::FutureExt;

const LOG_TARGET: &str = "poem::fallback";

// Tested in this order; the first keyword contained in the emotion wins.
const BANK: &[(&str, &str)] = &[
    (
        "sad",
        "In the depths of sadness, I find myself
searching for light in the darkness,
each tear a small rebellion
against the weight of this moment.

and in this feeling,
I find myself
completely,
beautifully
human.",
    ),
    (
        "happy",
        "Joy bubbles up from somewhere deep,
effervescent and golden,
painting my world in colors
I forgot existed.

this is how we heal—
one breath,
one heartbeat,
one moment
at a time.",
    ),
    (
        "angry",
        "Rage burns bright in my chest,
a fire that demands to be seen,
to be heard, to be felt
in all its fierce intensity.

so I let it flow,
let it breathe,
let it be
the poem
it was always
meant to become.",
    ),
    (
        "lonely",
        "Loneliness wraps around me
like a familiar blanket,
heavy with the weight
of all the words unspoken.

and maybe that's enough.
maybe I'm enough.
maybe this feeling
is exactly
where I need to be.",
    ),
    (
        "anxious",
        "My mind races like water
down a mountain stream,
thoughts tumbling over rocks
of what-if and maybe-not.

but here, in this breath,
I am still.
I am enough.
I am home.",
    ),
    (
        "euphoric",
        "I am electricity and starlight,
every cell singing
a song I've never heard
but somehow always knew.

this is what it means
to be alive,
to feel the universe
dancing in my veins.",
    ),
    (
        "nostalgic",
        "Memory is a gentle thief,
stealing me away
to golden afternoons
that smell like summer rain.

and I realize—
the past lives in me
not as loss,
but as treasure.",
    ),
    (
        "grateful",
        "Thank you, whispers my heart
to the morning light,
to the breath in my lungs,
to this moment of being.

gratitude flows like honey,
sweet and golden,
filling all the empty spaces
I didn't know existed.",
    ),
];

fn default_poem(emotion: &str) -> String {
    format!(
        "I hold this {emotion} like a secret,
tender and raw,
letting it flow through me
like water through cupped hands.

and I realize—
I am not broken.
I am breaking
open."
    )
}

/// Hand-written poems keyed by emotion keyword, used whenever the remote
/// service is unavailable.
#[derive(Clone, Copy, Debug, Default)]
pub struct FallbackPoemBank;

impl FallbackPoemBank {
    pub fn new() -> Self {
        Self
    }

    /// Registered keywords in match order.
    pub fn keywords(&self) -> impl Iterator<Item = &'static str> {
        BANK.iter().map(|(key, _)| *key)
    }

    pub fn matched_keyword(&self, emotion: &str) -> Option<&'static str> {
        let lowered = emotion.to_lowercase();
        BANK.iter()
            .map(|(key, _)| *key)
            .find(|key| lowered.contains(key))
    }

    pub fn lookup(&self, emotion: &str) -> String {
        let lowered = emotion.to_lowercase();
        match BANK.iter().find(|(key, _)| lowered.contains(key)) {
            Some((_, poem)) => (*poem).to_owned(),
            None => default_poem(emotion),
        }
    }
}

impl PoemSource for FallbackPoemBank {
    fn origin(&self) -> PoemOrigin {
        PoemOrigin::Fallback
    }

    fn compose(&self, request: PoemRequest) -> BoxFuture<'_, Result<String, RemoteError>> {
        async move {
            let emotion = request.emotion.as_str();
            tracing::debug!(
                target: LOG_TARGET,
                keyword = self.matched_keyword(emotion).unwrap_or("default"),
                "reciting banked poem"
            );
            Ok(self.lookup(emotion))
        }
        .boxed()
    }
}
