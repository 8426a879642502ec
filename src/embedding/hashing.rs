/// Deterministic feature-hashing embedder
///
/// Each lowercase word token lands in a `blake3`-chosen bucket with a hash-derived
/// sign, and the result is L2-normalized. No network, no model files: texts sharing
/// vocabulary end up close in L2 space.
use super::provider::{ProviderError, ProviderErrorKind, ProviderKind};

pub struct HashingProvider {
    dimension: usize,
}

impl HashingProvider {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn model_name(&self) -> &str {
        "feature-hashing"
    }

    pub fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        if self.dimension == 0 {
            return Err(ProviderError::new(
                ProviderKind::Hashing,
                ProviderErrorKind::Backend,
                "dimension must be greater than 0",
            ));
        }

        let lowered = text.to_lowercase();
        let mut tokens: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .collect();

        // Punctuation-only input still hashes to something stable
        let trimmed = lowered.trim();
        if tokens.is_empty() && !trimmed.is_empty() {
            tokens.push(trimmed);
        }
        if tokens.is_empty() {
            return Err(ProviderError::new(
                ProviderKind::Hashing,
                ProviderErrorKind::InvalidInput,
                "Empty text",
            ));
        }

        let mut vector = vec![0.0f32; self.dimension];
        for token in tokens {
            let (bucket, sign) = self.bucket(token);
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        } else {
            // Every token cancelled out; fall back to a single hashed feature
            let (bucket, _) = self.bucket(trimmed);
            vector[bucket] = 1.0;
        }

        Ok(vector)
    }

    fn bucket(&self, token: &str) -> (usize, f32) {
        let hash = blake3::hash(token.as_bytes());
        let bytes = hash.as_bytes();
        let mut index = [0u8; 8];
        index.copy_from_slice(&bytes[..8]);
        let bucket = (u64::from_le_bytes(index) % self.dimension as u64) as usize;
        let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
        (bucket, sign)
    }
}
