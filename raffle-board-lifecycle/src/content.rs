//! Generated raffle texts and prize images.
//!
//! Generation is best effort. Raffle creation never waits on it succeeding, so
//! the helpers here always hand back something usable: the generated content
//! when it is well formed, fallback content otherwise.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::MAX_IMAGE_URLS;

const FALLBACK_NAME_LENGTH: usize = 60;

const FALLBACK_NAME: &str = "Raffle";

const FALLBACK_DESCRIPTION: &str = "A raffle with 100 numbered slots.";

pub const FALLBACK_TERMS: &str = "Each slot can be taken by one participant. A slot takes part \
                                  in the drawing once it is paid. The winner is the holder of \
                                  the slot whose number is drawn on the finalization date.";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaffleText {
    pub name: String,
    pub description: String,
    pub terms: String,
}

impl RaffleText {
    fn is_well_formed(&self) -> bool {
        [&self.name, &self.description, &self.terms]
            .iter()
            .all(|field| !field.trim().is_empty())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ContentError {
    #[error("content generation is not configured")]
    Unconfigured,
    #[error("content generation timed out")]
    TimedOut,
    #[error("content generation returned malformed output: {0}")]
    Malformed(String),
    #[error("content generation failed: {0}")]
    Failed(#[source] Box<dyn std::error::Error + Send + Sync>),
}

#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate_raffle_text(&self, prompt: &str) -> Result<RaffleText, ContentError>;

    async fn generate_raffle_images(
        &self,
        description: &str,
        name: Option<&str>,
    ) -> Result<Vec<String>, ContentError>;
}

/// Generator used when no generation service is configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct Unconfigured;

#[async_trait]
impl ContentGenerator for Unconfigured {
    async fn generate_raffle_text(&self, _prompt: &str) -> Result<RaffleText, ContentError> {
        Err(ContentError::Unconfigured)
    }

    async fn generate_raffle_images(
        &self,
        _description: &str,
        _name: Option<&str>,
    ) -> Result<Vec<String>, ContentError> {
        Err(ContentError::Unconfigured)
    }
}

#[must_use]
pub fn fallback_text(prompt: &str) -> RaffleText {
    let prompt = prompt.trim();
    let first_line = prompt.lines().next().unwrap_or_default().trim();
    let name = if first_line.is_empty() {
        FALLBACK_NAME.to_owned()
    } else {
        first_line.chars().take(FALLBACK_NAME_LENGTH).collect()
    };
    let description = if prompt.is_empty() {
        FALLBACK_DESCRIPTION.to_owned()
    } else {
        prompt.to_owned()
    };
    RaffleText {
        name,
        description,
        terms: FALLBACK_TERMS.to_owned(),
    }
}

#[must_use]
pub fn placeholder_images() -> Vec<String> {
    (1..=MAX_IMAGE_URLS)
        .map(|index| format!("https://placehold.co/600x400?text=Prize+{index}"))
        .collect()
}

fn is_image_reference(reference: &str) -> bool {
    reference.starts_with("https://") || reference.starts_with("http://")
}

pub async fn generate_text_or_fallback(generator: &dyn ContentGenerator, prompt: &str) -> RaffleText {
    match generator.generate_raffle_text(prompt).await {
        Ok(text) if text.is_well_formed() => text,
        Ok(text) => {
            warn!("generated raffle text is incomplete, using fallback: {text:?}");
            fallback_text(prompt)
        }
        Err(err) => {
            warn!("raffle text generation failed, using fallback: {err}");
            fallback_text(prompt)
        }
    }
}

pub async fn generate_images_or_placeholders(
    generator: &dyn ContentGenerator,
    description: &str,
    name: Option<&str>,
) -> Vec<String> {
    match generator.generate_raffle_images(description, name).await {
        Ok(images) => {
            let images: Vec<String> = images
                .into_iter()
                .filter(|reference| is_image_reference(reference))
                .take(MAX_IMAGE_URLS)
                .collect();
            if images.is_empty() {
                warn!("image generation returned no usable references, using placeholders");
                placeholder_images()
            } else {
                images
            }
        }
        Err(err) => {
            warn!("image generation failed, using placeholders: {err}");
            placeholder_images()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Canned {
        text: Result<RaffleText, &'static str>,
        images: Result<Vec<String>, &'static str>,
    }

    #[async_trait]
    impl ContentGenerator for Canned {
        async fn generate_raffle_text(&self, _prompt: &str) -> Result<RaffleText, ContentError> {
            self.text
                .clone()
                .map_err(|message| ContentError::Malformed(message.to_owned()))
        }

        async fn generate_raffle_images(
            &self,
            _description: &str,
            _name: Option<&str>,
        ) -> Result<Vec<String>, ContentError> {
            self.images
                .clone()
                .map_err(|message| ContentError::Malformed(message.to_owned()))
        }
    }

    fn text(name: &str) -> RaffleText {
        RaffleText {
            name: name.to_owned(),
            description: "A brand new bike".to_owned(),
            terms: "Drawn live".to_owned(),
        }
    }

    #[tokio::test]
    async fn generated_text_is_used_when_complete() {
        let generator = Canned {
            text: Ok(text("Bike raffle")),
            images: Err("unused"),
        };
        let result = generate_text_or_fallback(&generator, "a bike").await;
        assert_eq!(result, text("Bike raffle"));
    }

    #[tokio::test]
    async fn incomplete_or_failed_text_falls_back_to_prompt() {
        let incomplete = Canned {
            text: Ok(text("  ")),
            images: Err("unused"),
        };
        let result = generate_text_or_fallback(&incomplete, "Mountain bike\nbarely used").await;
        assert_eq!(result.name, "Mountain bike");
        assert_eq!(result.description, "Mountain bike\nbarely used");
        assert_eq!(result.terms, FALLBACK_TERMS);

        let result = generate_text_or_fallback(&Unconfigured, "").await;
        assert_eq!(result.name, FALLBACK_NAME);
        assert_eq!(result.description, FALLBACK_DESCRIPTION);
    }

    #[test]
    fn fallback_name_is_shortened() {
        let prompt = "x".repeat(200);
        assert_eq!(fallback_text(&prompt).name.chars().count(), FALLBACK_NAME_LENGTH);
    }

    #[tokio::test]
    async fn images_are_filtered_and_capped() {
        let generator = Canned {
            text: Err("unused"),
            images: Ok(vec![
                "data:image/png;base64,AAAA".to_owned(),
                "https://images.example/1.png".to_owned(),
                "https://images.example/2.png".to_owned(),
                "https://images.example/3.png".to_owned(),
                "https://images.example/4.png".to_owned(),
            ]),
        };
        let images = generate_images_or_placeholders(&generator, "bike", None).await;
        assert_eq!(
            images,
            vec![
                "https://images.example/1.png",
                "https://images.example/2.png",
                "https://images.example/3.png",
            ]
        );
    }

    #[tokio::test]
    async fn unusable_images_become_placeholders() {
        let generator = Canned {
            text: Err("unused"),
            images: Ok(vec!["not a url".to_owned()]),
        };
        let images = generate_images_or_placeholders(&generator, "bike", Some("Bike")).await;
        assert_eq!(images, placeholder_images());
        assert_eq!(
            generate_images_or_placeholders(&Unconfigured, "bike", None).await,
            placeholder_images()
        );
    }
}
