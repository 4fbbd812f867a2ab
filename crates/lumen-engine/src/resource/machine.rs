use crate::device::{GpuError, GpuResult};

use super::state::{Barrier, ResourceKind, ResourceState};

/// Handle to a tracked resource. Assigned by the state machine in
/// registration order and never reused.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ResourceId(u32);

impl ResourceId {
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// Proof that a swapchain image is in the presentable state.
///
/// Only [`ResourceStateMachine::present_token`] creates one, and presenting
/// requires one.
#[derive(Debug)]
pub struct PresentToken {
    image: ResourceId,
}

impl PresentToken {
    pub fn image(&self) -> ResourceId {
        self.image
    }
}

#[derive(Debug, Clone)]
struct Tracked {
    label: &'static str,
    kind: ResourceKind,
    state: ResourceState,
    home: ResourceState,
}

/// Authoritative record of every shared resource's current GPU access state.
///
/// Transitions always start from the recorded state. A resource's home state
/// is the state it was registered in; each frame must bring every resource
/// back home.
#[derive(Debug, Default)]
pub struct ResourceStateMachine {
    resources: Vec<Tracked>,
}

impl ResourceStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts tracking a resource in `initial`, which becomes its home state.
    pub fn register(
        &mut self,
        label: &'static str,
        kind: ResourceKind,
        initial: ResourceState,
    ) -> GpuResult<ResourceId> {
        if !kind.permits(initial) {
            return Err(GpuError::init(format!(
                "{label}: {kind:?} cannot start in state {initial}"
            )));
        }

        let id = ResourceId(self.resources.len() as u32);
        self.resources.push(Tracked {
            label,
            kind,
            state: initial,
            home: initial,
        });
        Ok(id)
    }

    fn tracked(&self, id: ResourceId) -> GpuResult<&Tracked> {
        self.resources
            .get(id.0 as usize)
            .ok_or_else(|| GpuError::precondition(format!("unknown resource #{}", id.0)))
    }

    pub fn state(&self, id: ResourceId) -> GpuResult<ResourceState> {
        Ok(self.tracked(id)?.state)
    }

    pub fn kind(&self, id: ResourceId) -> GpuResult<ResourceKind> {
        Ok(self.tracked(id)?.kind)
    }

    pub fn label(&self, id: ResourceId) -> GpuResult<&'static str> {
        Ok(self.tracked(id)?.label)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Describes the barrier needed to move `id` into `target` without applying it.
    fn plan(&self, id: ResourceId, target: ResourceState) -> GpuResult<Option<Barrier>> {
        let tracked = self.tracked(id)?;
        if !tracked.kind.permits(target) {
            return Err(GpuError::precondition(format!(
                "{}: {:?} cannot enter state {target}",
                tracked.label, tracked.kind
            )));
        }
        if tracked.state == target {
            return Ok(None);
        }
        Ok(Some(Barrier {
            resource: id,
            before: tracked.state,
            after: target,
        }))
    }

    fn apply(&mut self, barrier: &Barrier) {
        if let Some(tracked) = self.resources.get_mut(barrier.resource.0 as usize) {
            debug_assert_eq!(tracked.state, barrier.before);
            tracked.state = barrier.after;
        }
    }

    /// Moves `id` into `target`.
    ///
    /// Returns `None` when the resource is already there; otherwise the barrier
    /// to record, which starts from the state last recorded for `id`.
    pub fn transition(
        &mut self,
        id: ResourceId,
        target: ResourceState,
    ) -> GpuResult<Option<Barrier>> {
        let barrier = self.plan(id, target)?;
        if let Some(b) = &barrier {
            self.apply(b);
        }
        Ok(barrier)
    }

    /// Starts a batch of transitions recorded at the same pipeline point.
    pub fn batch(&mut self) -> BarrierBatch<'_> {
        BarrierBatch {
            machine: self,
            barriers: Vec::new(),
            touched: Vec::new(),
        }
    }

    /// Resources not currently in their home state.
    pub fn away_from_home(&self) -> Vec<ResourceId> {
        self.resources
            .iter()
            .enumerate()
            .filter(|(_, t)| t.state != t.home)
            .map(|(i, _)| ResourceId(i as u32))
            .collect()
    }

    /// Issues a [`PresentToken`] if `image` is a presentable swapchain image.
    pub fn present_token(&self, image: ResourceId) -> GpuResult<PresentToken> {
        let tracked = self.tracked(image)?;
        if tracked.kind != ResourceKind::SwapchainImage {
            return Err(GpuError::precondition(format!(
                "{} is not a swapchain image",
                tracked.label
            )));
        }
        if tracked.state != ResourceState::Presentable {
            return Err(GpuError::precondition(format!(
                "{} presented while in state {}",
                tracked.label, tracked.state
            )));
        }
        Ok(PresentToken { image })
    }
}

/// Transitions collected for one barrier call.
///
/// States are committed only by [`finish`](Self::finish); a dropped batch
/// leaves the machine untouched. A resource may appear once per batch.
pub struct BarrierBatch<'m> {
    machine: &'m mut ResourceStateMachine,
    barriers: Vec<Barrier>,
    touched: Vec<ResourceId>,
}

impl BarrierBatch<'_> {
    pub fn transition(&mut self, id: ResourceId, target: ResourceState) -> GpuResult<&mut Self> {
        if self.touched.contains(&id) {
            return Err(GpuError::precondition(format!(
                "resource #{} transitioned twice in one batch",
                id.0
            )));
        }
        if let Some(barrier) = self.machine.plan(id, target)? {
            self.barriers.push(barrier);
        }
        self.touched.push(id);
        Ok(self)
    }

    /// Commits the batch and returns the barriers to record.
    pub fn finish(self) -> Vec<Barrier> {
        for barrier in &self.barriers {
            self.machine.apply(barrier);
        }
        self.barriers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ResourceState::*;

    fn machine() -> (ResourceStateMachine, ResourceId, ResourceId, ResourceId) {
        let mut m = ResourceStateMachine::new();
        let swap = m
            .register("swapchain 0", ResourceKind::SwapchainImage, Presentable)
            .unwrap();
        let out = m
            .register("compute output", ResourceKind::ComputeOutput, CopySource)
            .unwrap();
        let rt = m
            .register("overlay target", ResourceKind::RenderTarget, ShaderReadable)
            .unwrap();
        (m, swap, out, rt)
    }

    #[test]
    fn transition_to_current_state_is_a_no_op() {
        let (mut m, swap, _, _) = machine();
        assert_eq!(m.transition(swap, Presentable).unwrap(), None);
        assert_eq!(m.state(swap).unwrap(), Presentable);
    }

    #[test]
    fn transition_starts_from_recorded_state() {
        let (mut m, _, out, _) = machine();
        let first = m.transition(out, UnorderedAccess).unwrap().unwrap();
        assert_eq!((first.before, first.after), (CopySource, UnorderedAccess));

        let second = m.transition(out, CopySource).unwrap().unwrap();
        assert_eq!((second.before, second.after), (UnorderedAccess, CopySource));
    }

    #[test]
    fn forbidden_state_is_rejected_without_drift() {
        let (mut m, swap, _, _) = machine();
        let err = m.transition(swap, UnorderedAccess).unwrap_err();
        assert!(matches!(err, GpuError::Precondition(_)));
        assert_eq!(m.state(swap).unwrap(), Presentable);
    }

    #[test]
    fn register_rejects_forbidden_initial_state() {
        let mut m = ResourceStateMachine::new();
        assert!(
            m.register("ubo", ResourceKind::UniformBuffer, RenderTarget)
                .is_err()
        );
        assert!(m.is_empty());
    }

    #[test]
    fn batch_commits_only_on_finish() {
        let (mut m, swap, out, rt) = machine();
        {
            let mut batch = m.batch();
            batch.transition(swap, CopyDestination).unwrap();
            batch.transition(out, UnorderedAccess).unwrap();
        }
        assert!(m.away_from_home().is_empty());

        let mut batch = m.batch();
        batch
            .transition(swap, CopyDestination)
            .unwrap()
            .transition(out, UnorderedAccess)
            .unwrap()
            .transition(rt, RenderTarget)
            .unwrap();
        let barriers = batch.finish();
        assert_eq!(barriers.len(), 3);
        assert_eq!(m.away_from_home(), vec![swap, out, rt]);
    }

    #[test]
    fn batch_skips_resources_already_in_target() {
        let (mut m, swap, out, _) = machine();
        let mut batch = m.batch();
        batch.transition(swap, Presentable).unwrap();
        batch.transition(out, UnorderedAccess).unwrap();
        let barriers = batch.finish();
        assert_eq!(barriers.len(), 1);
        assert_eq!(barriers[0].resource, out);
    }

    #[test]
    fn batch_rejects_duplicate_resource() {
        let (mut m, _, out, _) = machine();
        let mut batch = m.batch();
        batch.transition(out, UnorderedAccess).unwrap();
        assert!(batch.transition(out, CopySource).is_err());
    }

    #[test]
    fn present_requires_presentable_swapchain_image() {
        let (mut m, swap, out, _) = machine();
        assert!(m.present_token(out).is_err());

        m.transition(swap, CopyDestination).unwrap();
        assert!(m.present_token(swap).is_err());

        m.transition(swap, Presentable).unwrap();
        assert_eq!(m.present_token(swap).unwrap().image(), swap);
    }

    #[test]
    fn frame_walk_returns_every_resource_home() {
        let (mut m, swap, out, rt) = machine();
        for _ in 0..3 {
            let mut open = m.batch();
            open.transition(swap, CopyDestination).unwrap();
            open.transition(out, UnorderedAccess).unwrap();
            open.transition(rt, RenderTarget).unwrap();
            open.finish();

            m.transition(rt, ShaderReadable).unwrap();
            m.transition(out, CopySource).unwrap();
            m.transition(swap, Presentable).unwrap();

            assert!(m.away_from_home().is_empty());
        }
    }

    #[test]
    fn unknown_resource_is_rejected() {
        let (mut m, _, _, _) = machine();
        assert!(m.transition(ResourceId::from_raw(42), CopySource).is_err());
    }
}
