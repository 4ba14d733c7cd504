//! Policy and value network.

pub mod actor_critic;


pub use actor_critic::{
    ActionEvaluation, ActionOutput, ModelConfig, RecurrentActorCritic, SequenceOutput, StepOutput,
};
