//! Engine dispatch keyed by experiment type.

use std::sync::Arc;

use orc_domain::ExperimentType;
use orc_store::{Store, TimerBoard};

use crate::common::EngineContext;
use crate::custom::CustomEngine;
use crate::daytrader::DayTraderEngine;
use crate::engine::GameEngine;
use crate::essayranking::EssayRankingEngine;
use crate::hiddenprofiles::HiddenProfilesEngine;
use crate::shapefactory::ShapeFactoryEngine;
use crate::wordguessing::WordGuessingEngine;

/// Builds and hands out engines over one shared store and timer board.
/// Engines are stateless beyond those handles, so the known kinds are
/// constructed once.
pub struct EngineFactory {
    ctx: EngineContext,
    shapefactory: Arc<ShapeFactoryEngine>,
    daytrader: Arc<DayTraderEngine>,
    essayranking: Arc<EssayRankingEngine>,
    wordguessing: Arc<WordGuessingEngine>,
    hiddenprofiles: Arc<HiddenProfilesEngine>,
}

impl EngineFactory {
    pub fn new(store: Arc<Store>, timers: Arc<TimerBoard>) -> Self {
        let ctx = EngineContext::new(store, timers);
        Self {
            shapefactory: Arc::new(ShapeFactoryEngine::new(ctx.clone())),
            daytrader: Arc::new(DayTraderEngine::new(ctx.clone())),
            essayranking: Arc::new(EssayRankingEngine::new(ctx.clone())),
            wordguessing: Arc::new(WordGuessingEngine::new(ctx.clone())),
            hiddenprofiles: Arc::new(HiddenProfilesEngine::new(ctx.clone())),
            ctx,
        }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.ctx.store
    }

    pub fn timers(&self) -> &Arc<TimerBoard> {
        &self.ctx.timers
    }

    /// The engine serving an experiment kind. `custom_*` kinds get the
    /// declarative custom engine.
    pub fn engine_for(&self, kind: &ExperimentType) -> Arc<dyn GameEngine> {
        match kind {
            ExperimentType::ShapeFactory => self.shapefactory.clone(),
            ExperimentType::DayTrader => self.daytrader.clone(),
            ExperimentType::EssayRanking => self.essayranking.clone(),
            ExperimentType::WordGuessing => self.wordguessing.clone(),
            ExperimentType::HiddenProfiles => self.hiddenprofiles.clone(),
            ExperimentType::Custom(_) => {
                Arc::new(CustomEngine::new(self.ctx.clone(), kind.clone()))
            }
        }
    }

    /// Typed access for researcher-side HiddenProfiles setup.
    pub fn hidden_profiles(&self) -> &Arc<HiddenProfilesEngine> {
        &self.hiddenprofiles
    }

    /// Typed access for researcher-side EssayRanking setup.
    pub fn essay_ranking(&self) -> &Arc<EssayRankingEngine> {
        &self.essayranking
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_covers_every_kind() {
        let factory = EngineFactory::new(Arc::new(Store::new()), Arc::new(TimerBoard::new()));
        for kind in [
            ExperimentType::ShapeFactory,
            ExperimentType::DayTrader,
            ExperimentType::EssayRanking,
            ExperimentType::WordGuessing,
            ExperimentType::HiddenProfiles,
            ExperimentType::Custom("custom_maze".into()),
        ] {
            let engine = factory.engine_for(&kind);
            let session = engine.create_session("r1", serde_json::json!({})).unwrap();
            assert_eq!(session.experiment_type, kind);
        }
    }
}
