//! 动画模块
//!
//! - channel: 关键帧通道与轨道（导入器边界，校验输入数组）
//! - sampler: 关键帧查找（二分 / 插值 / 线性）与插值
//! - component: 每个实体的动画状态机与关键帧编辑
//! - context: 全局动画时间与播放开关
//! - system: 每帧采样并写回 Transform / BlendShape

pub mod blend_shape;
pub mod channel;
pub mod component;
pub mod context;
pub mod sampler;
pub mod system;

pub use blend_shape::BlendShapeComponent;
pub use channel::{AnimationChannel, AnimationPath, AnimationTrack, InterpolationMode, KEYFRAME_TIME_EPSILON};
pub use component::{AnimationComponent, AnimationSample, AnimationState, RestPose};
pub use context::AnimationContext;
pub use sampler::{SampledValue, SearchStrategy, interpolate};
pub use system::update_animations;
