//! 测试卡场景
//!
//! 卡号决定网关给出的结果，未登记的卡号一律直接批准

use serde::{Deserialize, Serialize};

use crate::models::MockState;

/// 3DS 协议版本
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThreeDsVersion {
    V1,
    V2,
}

/// 卡片场景
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardScenario {
    Approve,
    Decline,
    Error,
    /// 保持处理中，直到状态查询达到设定次数
    Pending,
    ChallengeV1,
    ChallengeV2,
    /// 3DS1 挑战完成后拒绝
    ChallengeDecline,
}

/// 登记的测试卡号
const TEST_CARDS: [(&str, CardScenario); 6] = [
    ("4000000000000002", CardScenario::Decline),
    ("4000000000000119", CardScenario::Error),
    ("4000000000000259", CardScenario::Pending),
    ("4000000000001091", CardScenario::ChallengeV1),
    ("4000000000003220", CardScenario::ChallengeV2),
    ("4000000000000036", CardScenario::ChallengeDecline),
];

impl CardScenario {
    /// 按卡号选择场景，忽略空白
    pub fn from_card(card_number: &str) -> Self {
        let normalized: String = card_number.chars().filter(|c| !c.is_whitespace()).collect();
        TEST_CARDS
            .iter()
            .find(|(number, _)| *number == normalized)
            .map(|(_, scenario)| *scenario)
            .unwrap_or(Self::Approve)
    }

    /// 全部登记卡号，供 CLI 列出
    pub fn catalog() -> &'static [(&'static str, CardScenario)] {
        &TEST_CARDS
    }

    /// 下单响应中的初始状态
    pub fn initial_state(self) -> MockState {
        match self {
            Self::Approve => MockState::Approved,
            Self::Decline => MockState::Declined,
            Self::Error => MockState::Error,
            Self::Pending | Self::ChallengeV1 | Self::ChallengeV2 | Self::ChallengeDecline => {
                MockState::Processing
            }
        }
    }

    pub fn challenge(self) -> Option<ThreeDsVersion> {
        match self {
            Self::ChallengeV1 | Self::ChallengeDecline => Some(ThreeDsVersion::V1),
            Self::ChallengeV2 => Some(ThreeDsVersion::V2),
            _ => None,
        }
    }

    /// 挑战完成后的终态
    pub fn after_challenge(self) -> MockState {
        match self {
            Self::ChallengeDecline => MockState::Declined,
            _ => MockState::Approved,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::Approve => "直接批准",
            Self::Decline => "直接拒绝",
            Self::Error => "网关错误",
            Self::Pending => "处理中，若干次状态查询后批准",
            Self::ChallengeV1 => "3DS1 挑战后批准",
            Self::ChallengeV2 => "3DS2 挑战后批准",
            Self::ChallengeDecline => "3DS1 挑战后拒绝",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_card() {
        assert_eq!(
            CardScenario::from_card("4000 0000 0000 1091"),
            CardScenario::ChallengeV1
        );
        assert_eq!(
            CardScenario::from_card("4000000000000002"),
            CardScenario::Decline
        );
        assert_eq!(
            CardScenario::from_card("4111111111111111"),
            CardScenario::Approve
        );
    }

    #[test]
    fn test_challenge_outcomes() {
        assert_eq!(CardScenario::ChallengeV2.challenge(), Some(ThreeDsVersion::V2));
        assert_eq!(CardScenario::Pending.challenge(), None);
        assert_eq!(
            CardScenario::ChallengeDecline.after_challenge(),
            MockState::Declined
        );
        assert_eq!(CardScenario::ChallengeV1.initial_state(), MockState::Processing);
    }
}
