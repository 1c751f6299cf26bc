use decision_core::types::{AdvisoryAssessment, Direction};
use tracing::{debug, warn};

/// Outcome of blending technical and advisory confidence
#[derive(Debug, Clone, Copy)]
pub struct FusedConfidence {
    /// 0-100
    pub confidence: f64,
    pub direction: Direction,
    pub agree: bool,
}

/// Convex blend of technical confidence (0-100) with the advisory assessment.
/// A neutral advisory contributes zero directional confidence instead of
/// vetoing. Agreement earns +10, a hard conflict costs -15, and the result is
/// clamped to 0-100. On conflict the higher-confidence side sets the
/// direction; both raw inputs stay visible to the caller.
pub fn fuse_confidence(
    technical: f64,
    technical_direction: Direction,
    advisory: Option<&AdvisoryAssessment>,
    advisory_weight: f64,
) -> FusedConfidence {
    let advisory = match advisory {
        Some(advisory) => advisory,
        None => {
            return FusedConfidence {
                confidence: technical.clamp(0.0, 100.0),
                direction: technical_direction,
                agree: false,
            }
        }
    };

    let weight = advisory_weight.clamp(0.0, 1.0);
    let advisory_confidence = advisory.confidence * 100.0;
    let advisory_direction = advisory.direction;

    let advisory_directional = if advisory_direction == Direction::Neutral {
        debug!("advisory recommends hold, zero directional confidence");
        0.0
    } else {
        advisory_confidence
    };

    let base = technical * (1.0 - weight) + advisory_directional * weight;

    let (agree, adjustment) = if technical_direction == advisory_direction
        && technical_direction != Direction::Neutral
    {
        (true, 10.0)
    } else if advisory_direction == Direction::Neutral {
        (false, 0.0)
    } else if technical_direction == advisory_direction.opposite()
        && technical_direction != Direction::Neutral
    {
        warn!(
            technical = technical_direction.as_str(),
            advisory = advisory_direction.as_str(),
            "direction conflict, applying penalty"
        );
        (false, -15.0)
    } else {
        (false, 0.0)
    };

    let confidence = (base + adjustment).clamp(0.0, 100.0);

    let direction = if agree {
        technical_direction
    } else if technical_direction == Direction::Neutral {
        advisory_direction
    } else if advisory_direction == Direction::Neutral {
        technical_direction
    } else if advisory_confidence > technical {
        advisory_direction
    } else {
        technical_direction
    };

    FusedConfidence {
        confidence,
        direction,
        agree,
    }
}
