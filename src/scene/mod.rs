//! 场景图系统模块
//!
//! 管理场景层级结构和组件：
//! - Transform: 局部变换（平移、旋转、缩放，惰性缓存矩阵）
//! - SceneGraph: 父子关系、世界矩阵与包围盒缓存
//! - TransformSystem: 自顶向下的批量世界矩阵更新
//! - Mesh / Raycast: 网格包围盒与射线拾取
//! - Skeleton: 蒙皮关节矩阵

pub mod bounds;
pub mod mesh;
pub mod raycast;
pub mod scene_graph;
pub mod skeleton;
pub mod transform;
pub mod transform_system;

// 重新导出常用类型
pub use bounds::{BoundingBox, Ray};
pub use mesh::{MeshComponent, MeshPrimitive, TrianglePrimitive};
pub use raycast::{RaycastHit, screen_ray};
pub use scene_graph::{SceneGraphComponent, TransformMut};
pub use skeleton::{JointPacking, JointTrs, SkeletalComponent};
pub use transform::{TransformComponent, TransformParams};
pub use transform_system::{LevelOrderBatches, build_level_order_batches, update_batch, update_world_matrices};
