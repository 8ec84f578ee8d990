use std::cell::Cell;

use bitflags::bitflags;
use glam::{EulerRot, Mat3, Mat4, Quat, Vec3};

/// Euler angle order used by [`TransformComponent::rotation`].
pub const EULER_ORDER: EulerRot = EulerRot::XYZ;

bitflags! {
    /// Representations that are stale and must be derived on next read.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    struct Dirty: u8 {
        const TRANSLATE      = 1 << 0;
        const ROTATION       = 1 << 1;
        const QUATERNION     = 1 << 2;
        const SCALE          = 1 << 3;
        const MATRIX         = 1 << 4;
        const NORMAL_MATRIX  = 1 << 5;
        const INVERSE_MATRIX = 1 << 6;

        const DERIVED = Self::MATRIX.bits() | Self::NORMAL_MATRIX.bits() | Self::INVERSE_MATRIX.bits();
    }
}

/// Multi-field write for [`TransformComponent::set_transform`].
///
/// The caller guarantees that every supplied field describes the same
/// transform. When `matrix` is present it becomes the source of truth and the
/// other supplied fields are stored as already-derived caches; otherwise
/// `quaternion` wins over `rotation` for rotation.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TransformParams {
    pub translate: Option<Vec3>,
    pub rotation: Option<Vec3>,
    pub scale: Option<Vec3>,
    pub quaternion: Option<Quat>,
    pub matrix: Option<Mat4>,
}

impl TransformParams {
    fn is_empty(&self) -> bool {
        self.translate.is_none()
            && self.rotation.is_none()
            && self.scale.is_none()
            && self.quaternion.is_none()
            && self.matrix.is_none()
    }
}

/// Local transform of an entity.
///
/// Holds translate, Euler rotation, quaternion, scale and the local matrix,
/// plus the derived normal and inverse matrices. Exactly one side is
/// authoritative at a time: either the matrix, or the TRS fields (with either
/// the quaternion or the Euler angles as the rotation source). Reads derive a
/// stale representation from the authoritative one and cache it.
///
/// Every mutating call bumps [`update_count`](Self::update_count), which
/// consumers compare against a remembered value to detect changes without
/// recomputing anything.
#[derive(Debug, Clone)]
pub struct TransformComponent {
    translate: Cell<Vec3>,
    rotation: Cell<Vec3>,
    quaternion: Cell<Quat>,
    scale: Cell<Vec3>,
    matrix: Cell<Mat4>,
    normal_matrix: Cell<Mat3>,
    inverse_matrix: Cell<Mat4>,

    dirty: Cell<Dirty>,
    update_count: u64,
}

impl TransformComponent {
    #[must_use]
    pub fn new() -> Self {
        Self {
            translate: Cell::new(Vec3::ZERO),
            rotation: Cell::new(Vec3::ZERO),
            quaternion: Cell::new(Quat::IDENTITY),
            scale: Cell::new(Vec3::ONE),
            matrix: Cell::new(Mat4::IDENTITY),
            normal_matrix: Cell::new(Mat3::IDENTITY),
            inverse_matrix: Cell::new(Mat4::IDENTITY),
            dirty: Cell::new(Dirty::empty()),
            update_count: 0,
        }
    }

    #[must_use]
    pub fn from_matrix(matrix: Mat4) -> Self {
        let mut transform = Self::new();
        transform.set_matrix(matrix);
        transform
    }

    #[must_use]
    pub fn from_trs(translate: Vec3, quaternion: Quat, scale: Vec3) -> Self {
        let mut transform = Self::new();
        transform.set_transform(TransformParams {
            translate: Some(translate),
            quaternion: Some(quaternion),
            scale: Some(scale),
            ..Default::default()
        });
        transform
    }

    /// Monotonic counter bumped by every mutating call.
    #[inline]
    #[must_use]
    pub fn update_count(&self) -> u64 {
        self.update_count
    }

    // ========================================================================
    // Setters
    // ========================================================================

    pub fn set_translate(&mut self, translate: Vec3) {
        self.sync_from_matrix();
        self.translate.set(translate);
        self.mark(Dirty::TRANSLATE, Dirty::DERIVED);
    }

    pub fn set_scale(&mut self, scale: Vec3) {
        self.sync_from_matrix();
        self.scale.set(scale);
        self.mark(Dirty::SCALE, Dirty::DERIVED);
    }

    /// Sets the rotation as Euler angles (radians, [`EULER_ORDER`]).
    pub fn set_rotation(&mut self, rotation: Vec3) {
        self.sync_from_matrix();
        self.rotation.set(rotation);
        self.mark(Dirty::ROTATION, Dirty::QUATERNION | Dirty::DERIVED);
    }

    pub fn set_quaternion(&mut self, quaternion: Quat) {
        self.sync_from_matrix();
        self.quaternion.set(quaternion);
        self.mark(Dirty::QUATERNION, Dirty::ROTATION | Dirty::DERIVED);
    }

    /// Overwrites the local matrix; translate, rotation and scale are
    /// decomposed from it lazily.
    pub fn set_matrix(&mut self, matrix: Mat4) {
        self.matrix.set(matrix);
        self.mark(
            Dirty::MATRIX,
            Dirty::TRANSLATE
                | Dirty::ROTATION
                | Dirty::QUATERNION
                | Dirty::SCALE
                | Dirty::NORMAL_MATRIX
                | Dirty::INVERSE_MATRIX,
        );
    }

    /// Atomic multi-field write. See [`TransformParams`] for the precedence
    /// rules; no consistency check is performed between the fields.
    pub fn set_transform(&mut self, params: TransformParams) {
        if params.is_empty() {
            return;
        }

        if let Some(matrix) = params.matrix {
            self.set_matrix(matrix);
            let mut fresh = Dirty::empty();
            if let Some(translate) = params.translate {
                self.translate.set(translate);
                fresh |= Dirty::TRANSLATE;
            }
            if let Some(scale) = params.scale {
                self.scale.set(scale);
                fresh |= Dirty::SCALE;
            }
            if let Some(quaternion) = params.quaternion {
                self.quaternion.set(quaternion);
                fresh |= Dirty::QUATERNION;
            }
            if let Some(rotation) = params.rotation {
                self.rotation.set(rotation);
                fresh |= Dirty::ROTATION;
            }
            self.dirty.set(self.dirty.get() - fresh);
            return;
        }

        self.sync_from_matrix();
        let mut fresh = Dirty::empty();
        let mut stale = Dirty::DERIVED;

        if let Some(translate) = params.translate {
            self.translate.set(translate);
            fresh |= Dirty::TRANSLATE;
        }
        if let Some(scale) = params.scale {
            self.scale.set(scale);
            fresh |= Dirty::SCALE;
        }
        match (params.quaternion, params.rotation) {
            (Some(quaternion), Some(rotation)) => {
                self.quaternion.set(quaternion);
                self.rotation.set(rotation);
                fresh |= Dirty::QUATERNION | Dirty::ROTATION;
            }
            (Some(quaternion), None) => {
                self.quaternion.set(quaternion);
                fresh |= Dirty::QUATERNION;
                stale |= Dirty::ROTATION;
            }
            (None, Some(rotation)) => {
                self.rotation.set(rotation);
                fresh |= Dirty::ROTATION;
                stale |= Dirty::QUATERNION;
            }
            (None, None) => {}
        }

        self.mark(fresh, stale);
    }

    /// Rotates so that local -Z points at `target` (in parent space).
    /// Does nothing when `target - translate` is parallel to `up`.
    pub fn look_at(&mut self, target: Vec3, up: Vec3) {
        let forward = (target - self.translate()).normalize_or_zero();
        let right = forward.cross(up);
        if right.length_squared() < 1e-8 {
            return;
        }
        let right = right.normalize();
        let new_up = right.cross(forward).normalize();
        let basis = Mat3::from_cols(right, new_up, -forward);
        self.set_quaternion(Quat::from_mat3(&basis));
    }

    // ========================================================================
    // Lazy getters
    // ========================================================================

    #[must_use]
    pub fn translate(&self) -> Vec3 {
        self.sync_from_matrix();
        self.translate.get()
    }

    #[must_use]
    pub fn scale(&self) -> Vec3 {
        self.sync_from_matrix();
        self.scale.get()
    }

    #[must_use]
    pub fn quaternion(&self) -> Quat {
        let dirty = self.dirty.get();
        if dirty.contains(Dirty::QUATERNION) {
            if dirty.contains(Dirty::ROTATION) {
                self.sync_from_matrix();
            } else {
                let r = self.rotation.get();
                self.quaternion.set(Quat::from_euler(EULER_ORDER, r.x, r.y, r.z));
                self.clean(Dirty::QUATERNION);
            }
        }
        self.quaternion.get()
    }

    /// Euler angles (radians, [`EULER_ORDER`]).
    #[must_use]
    pub fn rotation(&self) -> Vec3 {
        if self.dirty.get().contains(Dirty::ROTATION) {
            let (x, y, z) = self.quaternion().to_euler(EULER_ORDER);
            self.rotation.set(Vec3::new(x, y, z));
            self.clean(Dirty::ROTATION);
        }
        self.rotation.get()
    }

    /// Local matrix, composed as `T * R * S`.
    #[must_use]
    pub fn matrix(&self) -> Mat4 {
        if self.dirty.get().contains(Dirty::MATRIX) {
            let quaternion = self.quaternion();
            self.matrix.set(Mat4::from_scale_rotation_translation(
                self.scale.get(),
                quaternion,
                self.translate.get(),
            ));
            self.clean(Dirty::MATRIX);
        }
        self.matrix.get()
    }

    /// Inverse-transpose of the upper 3x3 of the local matrix.
    #[must_use]
    pub fn normal_matrix(&self) -> Mat3 {
        if self.dirty.get().contains(Dirty::NORMAL_MATRIX) {
            let m = Mat3::from_mat4(self.matrix());
            self.normal_matrix.set(m.inverse().transpose());
            self.clean(Dirty::NORMAL_MATRIX);
        }
        self.normal_matrix.get()
    }

    #[must_use]
    pub fn inverse_matrix(&self) -> Mat4 {
        if self.dirty.get().contains(Dirty::INVERSE_MATRIX) {
            self.inverse_matrix.set(self.matrix().inverse());
            self.clean(Dirty::INVERSE_MATRIX);
        }
        self.inverse_matrix.get()
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Decomposes the matrix into whichever of translate / scale / rotation
    /// is stale. A no-op unless the matrix was the last thing written.
    fn sync_from_matrix(&self) {
        let dirty = self.dirty.get();
        let rotation_from_matrix = dirty.contains(Dirty::QUATERNION | Dirty::ROTATION);
        if !dirty.intersects(Dirty::TRANSLATE | Dirty::SCALE) && !rotation_from_matrix {
            return;
        }

        let (scale, quaternion, translate) = self.matrix.get().to_scale_rotation_translation();
        let mut fresh = Dirty::empty();
        if dirty.contains(Dirty::TRANSLATE) {
            self.translate.set(translate);
            fresh |= Dirty::TRANSLATE;
        }
        if dirty.contains(Dirty::SCALE) {
            self.scale.set(scale);
            fresh |= Dirty::SCALE;
        }
        if rotation_from_matrix {
            self.quaternion.set(quaternion);
            fresh |= Dirty::QUATERNION;
        }
        self.clean(fresh);
    }

    #[inline]
    fn clean(&self, flags: Dirty) {
        self.dirty.set(self.dirty.get() - flags);
    }

    #[inline]
    fn mark(&mut self, fresh: Dirty, stale: Dirty) {
        self.dirty.set((self.dirty.get() - fresh) | stale);
        self.update_count = self.update_count.wrapping_add(1);
    }
}

impl Default for TransformComponent {
    fn default() -> Self {
        Self::new()
    }
}
