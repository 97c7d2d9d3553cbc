//! Sharing, ghosting, and ownership operations of [`BulkData`].
//!
//! Everything here is local bookkeeping. The cross-process agreement on
//! owners, sharers, and induced parts of shared entities happens in
//! `modification_end` through the [`DistributedIndex`] collaborator.
//!
//! [`DistributedIndex`]: stratamesh_parallel::DistributedIndex

use std::collections::BTreeMap;

use tracing::{debug, info};

use stratamesh_foundation::{
    Entity, EntityKey, EntityState, Error, ErrorKind, GhostingOrdinal, OrdinalSet, PartOrdinal,
    ProcRank, Result,
};
use stratamesh_parallel::{
    EntityCommInfo, EntityCommList, Ghosting, InducedParts, KeyClaim, KeySharing,
};

use crate::bulk::BulkData;

fn single(part: PartOrdinal) -> OrdinalSet<PartOrdinal> {
    [part].into_iter().collect()
}

impl BulkData {
    // =========================================================================
    // Comm Queries
    // =========================================================================

    /// Returns true if `proc` shares the entity.
    #[must_use]
    pub fn in_shared(&self, key: EntityKey, proc: ProcRank) -> bool {
        self.comm_list.in_shared(key, proc)
    }

    /// Returns true if any other process shares the entity.
    #[must_use]
    pub fn is_shared(&self, key: EntityKey) -> bool {
        self.comm_list.is_shared(key)
    }

    /// Returns true if this process sends the entity to `proc` as a ghost
    /// under any ghosting.
    #[must_use]
    pub fn in_send_ghost(&self, key: EntityKey, proc: ProcRank) -> bool {
        self.comm_list.find(key).is_some_and(|entry| {
            entry.infos.iter().any(|info| {
                info.ghost_id != GhostingOrdinal::SHARED
                    && info.proc != entry.owner
                    && info.proc == proc
            })
        })
    }

    /// Returns true if this process receives the entity from its owner
    /// under `ghosting`.
    #[must_use]
    pub fn in_receive_ghost(&self, ghosting: GhostingOrdinal, key: EntityKey) -> bool {
        self.comm_list.find(key).is_some_and(|entry| {
            entry.owner != self.parallel_rank()
                && self.comm_list.in_ghost(ghosting, key, entry.owner)
        })
    }

    /// Returns true if the entity has the record `(ghosting, proc)`.
    #[must_use]
    pub fn in_ghost(&self, ghosting: GhostingOrdinal, key: EntityKey, proc: ProcRank) -> bool {
        self.comm_list.in_ghost(ghosting, key, proc)
    }

    /// Returns every process the entity is shared with or ghosted to or
    /// from, sorted.
    #[must_use]
    pub fn comm_procs(&self, key: EntityKey) -> Vec<ProcRank> {
        self.comm_list.comm_procs(key)
    }

    /// Returns the processes recorded for the entity under one ghosting.
    #[must_use]
    pub fn comm_procs_for_ghosting(&self, ghosting: GhostingOrdinal, key: EntityKey) -> Vec<ProcRank> {
        self.comm_list.comm_procs_for(ghosting, key)
    }

    /// Returns the sharing records of the entity.
    #[must_use]
    pub fn entity_comm_sharing(&self, key: EntityKey) -> Vec<EntityCommInfo> {
        self.comm_list
            .find(key)
            .map(|entry| {
                entry
                    .infos
                    .iter()
                    .copied()
                    .filter(|info| info.ghost_id == GhostingOrdinal::SHARED)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Returns the whole comm list.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::NotSynchronized`] inside a modification cycle,
    /// where entries of destroyed entities have not been erased yet.
    pub fn comm_list(&self) -> Result<&EntityCommList> {
        self.require_synchronized("comm_list")?;
        Ok(&self.comm_list)
    }

    // =========================================================================
    // Ghostings
    // =========================================================================

    /// Returns every ghosting, the builtin ones first.
    #[must_use]
    pub fn ghostings(&self) -> &[Ghosting] {
        &self.ghostings
    }

    /// Returns a ghosting by ordinal.
    #[must_use]
    pub fn ghosting(&self, ordinal: GhostingOrdinal) -> Option<&Ghosting> {
        self.ghostings.get(ordinal.index() as usize)
    }

    /// Returns a ghosting by name.
    #[must_use]
    pub fn ghosting_by_name(&self, name: &str) -> Option<&Ghosting> {
        self.ghostings.iter().find(|g| g.name() == name)
    }

    /// Returns the builtin ghosting of shared entities.
    #[must_use]
    pub fn shared_ghosting(&self) -> Option<&Ghosting> {
        self.ghosting(GhostingOrdinal::SHARED)
    }

    /// Returns the builtin aura ghosting.
    #[must_use]
    pub fn aura_ghosting(&self) -> Option<&Ghosting> {
        self.ghosting(GhostingOrdinal::SHARED_AURA)
    }

    fn ghosting_or_err(&self, ordinal: GhostingOrdinal) -> Result<&Ghosting> {
        self.ghosting(ordinal)
            .ok_or_else(|| Error::new(ErrorKind::UnknownGhosting(format!("{ordinal:?}"))))
    }

    /// Rejects the shared ghosting, whose records only sharing resolution
    /// may change.
    fn require_custom_records(&self, ordinal: GhostingOrdinal) -> Result<()> {
        let ghosting = self.ghosting_or_err(ordinal)?;
        if ordinal == GhostingOrdinal::SHARED {
            return Err(Error::new(ErrorKind::ReservedGhosting(
                ghosting.name().to_string(),
            )));
        }
        Ok(())
    }

    fn touch_ghosting(&mut self, ordinal: GhostingOrdinal) {
        let sync_count = self.sync_count;
        if let Some(ghosting) = self.ghostings.get_mut(ordinal.index() as usize) {
            ghosting.touch(sync_count);
        }
    }

    fn require_proc(&self, proc: ProcRank) -> Result<()> {
        let size = self.parallel_size();
        if (proc as usize) < size {
            Ok(())
        } else {
            Err(Error::new(ErrorKind::BadProcRank { proc, size }))
        }
    }

    /// Declares a new, empty ghosting.
    ///
    /// # Errors
    ///
    /// Returns an error outside a modification cycle or if the name is
    /// already taken.
    pub fn create_ghosting(&mut self, name: &str) -> Result<GhostingOrdinal> {
        self.require_ok_to_modify("create_ghosting")?;
        if self.ghosting_by_name(name).is_some() {
            return Err(Error::new(ErrorKind::DuplicateName(format!(
                "ghosting {name}"
            ))));
        }
        let index = u32::try_from(self.ghostings.len())
            .map_err(|_| Error::internal("ghosting ordinals exhausted"))?;
        let ordinal = GhostingOrdinal::from_index(index);
        self.ghostings
            .push(Ghosting::new(name, ordinal, self.sync_count));
        info!(name, ?ordinal, "created ghosting");
        Ok(ordinal)
    }

    /// Adds send records for locally owned entities and drops receive
    /// records.
    ///
    /// Received ghosts left with no comm records at all are destroyed,
    /// highest rank first.
    ///
    /// # Errors
    ///
    /// Returns an error outside a modification cycle, for an unknown or the
    /// shared ghosting, for a destroyed or remotely owned entity to send, or
    /// for a destination outside the process group.
    pub fn change_ghosting(
        &mut self,
        ghosting: GhostingOrdinal,
        add_send: &[(Entity, ProcRank)],
        remove_receive: &[EntityKey],
    ) -> Result<()> {
        self.require_ok_to_modify("change_ghosting")?;
        self.require_custom_records(ghosting)?;
        let local = self.parallel_rank();

        for &(entity, proc) in add_send {
            self.require_valid(entity)?;
            self.require_entity_owner(entity, local)?;
            self.require_proc(proc)?;
            if proc == local {
                continue;
            }
            let key = self.entity_key(entity);
            self.comm_list.insert(key, entity, local);
            self.comm_list
                .insert_info(key, EntityCommInfo::new(ghosting, proc));
        }

        let mut orphans = Vec::new();
        for &key in remove_receive {
            let Some(entry) = self.comm_list.find(key) else {
                continue;
            };
            if entry.owner == local {
                continue;
            }
            let entity = entry.entity;
            if self.comm_list.erase_ghosting(key, ghosting) && self.comm_procs(key).is_empty() {
                orphans.push(entity);
            }
        }
        self.destroy_orphans(orphans)?;

        self.touch_ghosting(ghosting);
        debug!(?ghosting, sends = add_send.len(), removes = remove_receive.len(), "changed ghosting");
        Ok(())
    }

    /// Records a ghost of `key` received from `owner` under `ghosting`.
    ///
    /// The ghost is created if absent and joins the aura part and `parts`.
    ///
    /// # Errors
    ///
    /// Returns an error outside a modification cycle, for an unknown or the
    /// shared ghosting, for a bad key or owner, for invalid parts, or if the
    /// entity is owned by this process.
    pub fn receive_ghost(
        &mut self,
        ghosting: GhostingOrdinal,
        key: EntityKey,
        owner: ProcRank,
        parts: &[PartOrdinal],
    ) -> Result<Entity> {
        self.require_ok_to_modify("receive_ghost")?;
        self.require_custom_records(ghosting)?;
        self.require_good_rank_and_id(key.rank(), key.id())?;
        self.require_proc(owner)?;
        let local = self.parallel_rank();
        if owner == local {
            return Err(Error::new(ErrorKind::LocalGhost(key)));
        }

        let mut add = self.validate_user_parts(key.rank(), parts, true)?;
        add.insert(PartOrdinal::AURA);

        let entity = match self.repository.get(key) {
            Some(existing) => {
                let current = self.parallel_owner_rank(existing);
                if current == local {
                    return Err(Error::new(ErrorKind::OwnerMismatch {
                        key,
                        owner: current,
                        expected: owner,
                    }));
                }
                self.internal_change_entity_parts(existing, &add, &OrdinalSet::new())?;
                existing
            }
            None => self.internal_create_entity(key, owner, add).0,
        };

        self.comm_list.insert(key, entity, owner);
        self.comm_list
            .insert_info(key, EntityCommInfo::new(ghosting, owner));
        self.touch_ghosting(ghosting);
        debug!(%key, owner, ?ghosting, "received ghost");
        Ok(entity)
    }

    /// Drops every record of a custom ghosting and destroys the received
    /// ghosts nothing else references.
    ///
    /// # Errors
    ///
    /// Returns an error outside a modification cycle or for an unknown or
    /// builtin ghosting.
    pub fn destroy_ghosting(&mut self, ghosting: GhostingOrdinal) -> Result<()> {
        self.require_ok_to_modify("destroy_ghosting")?;
        let record = self.ghosting_or_err(ghosting)?;
        if record.is_builtin() {
            return Err(Error::new(ErrorKind::ReservedGhosting(
                record.name().to_string(),
            )));
        }

        let local = self.parallel_rank();
        let keys: Vec<EntityKey> = self
            .comm_list
            .iter()
            .filter(|entry| entry.procs_for(ghosting).next().is_some())
            .map(|entry| entry.key)
            .collect();
        let mut orphans = Vec::new();
        for key in keys {
            self.comm_list.erase_ghosting(key, ghosting);
            if let Some(entry) = self.comm_list.find(key) {
                if entry.owner != local && entry.infos.is_empty() {
                    orphans.push(entry.entity);
                }
            }
        }
        self.destroy_orphans(orphans)?;

        self.touch_ghosting(ghosting);
        info!(?ghosting, "destroyed ghosting");
        Ok(())
    }

    fn destroy_orphans(&mut self, mut orphans: Vec<Entity>) -> Result<()> {
        orphans.retain(|&e| self.entities.is_valid(e));
        orphans.sort_by_key(|&e| std::cmp::Reverse(self.entity_rank(e)));
        for entity in orphans {
            self.destroy_entity(entity)?;
        }
        Ok(())
    }

    // =========================================================================
    // Ownership
    // =========================================================================

    /// Hands locally owned entities to other processes.
    ///
    /// Locally the entity leaves the locally owned part and is recorded as
    /// shared with its new owner until `modification_end` confirms the
    /// transfer.
    ///
    /// # Errors
    ///
    /// Returns an error outside a modification cycle, for a destroyed or
    /// remotely owned entity, or for a new owner outside the process group.
    pub fn change_entity_owner(&mut self, changes: &[(Entity, ProcRank)]) -> Result<()> {
        self.require_ok_to_modify("change_entity_owner")?;
        let local = self.parallel_rank();
        for &(entity, owner) in changes {
            self.require_valid(entity)?;
            self.require_entity_owner(entity, local)?;
            self.require_proc(owner)?;
            if owner == local {
                continue;
            }

            let key = self.entity_key(entity);
            self.entities.set_owner(entity, owner);
            self.comm_list.insert(key, entity, owner);
            self.comm_list.change_owner(key, owner);
            self.comm_list
                .insert_info(key, EntityCommInfo::new(GhostingOrdinal::SHARED, owner));
            self.internal_change_entity_parts(
                entity,
                &single(PartOrdinal::GLOBALLY_SHARED),
                &single(PartOrdinal::LOCALLY_OWNED),
            )?;
            self.mark_modified(entity);
            debug!(%key, owner, "changed entity owner");
        }
        Ok(())
    }

    /// Sets the owner recorded for `key` in the comm list and on the entity.
    /// Returns true if the comm list changed.
    ///
    /// # Errors
    ///
    /// Returns an error outside a modification cycle.
    pub fn change_owner_in_comm_data(&mut self, key: EntityKey, owner: ProcRank) -> Result<bool> {
        self.require_ok_to_modify("change_owner_in_comm_data")?;
        if let Some(entity) = self.repository.get(key) {
            self.entities.set_owner(entity, owner);
        }
        Ok(self.comm_list.change_owner(key, owner))
    }

    /// Copies every live entity's owner into its comm entry. Returns the
    /// number of entries that changed.
    pub fn sync_comm_list_owners(&mut self) -> usize {
        let entities = &self.entities;
        let mut changed = 0;
        for entry in self.comm_list.iter_mut() {
            if !entities.is_valid(entry.entity) {
                continue;
            }
            let owner = entities.owner(entry.entity);
            if entry.owner != owner {
                entry.owner = owner;
                changed += 1;
            }
        }
        changed
    }

    // =========================================================================
    // End-of-cycle Resolution
    // =========================================================================

    /// Claims every entity created or modified this cycle and applies the
    /// owners and sharers the distributed index decides.
    ///
    /// Received ghosts are not claimed. The collective runs even with no
    /// claims.
    pub(crate) fn resolve_ownership_and_sharing(&mut self) -> Result<()> {
        let local = self.parallel_rank();
        let claims: Vec<KeyClaim> = self
            .entities
            .iter()
            .filter(|&e| {
                matches!(
                    self.entities.state(e),
                    EntityState::Created | EntityState::Modified
                ) && !self.member(e, PartOrdinal::AURA)
            })
            .map(|e| KeyClaim {
                key: self.entities.key(e),
                proc: local,
                owner: self.entities.owner(e),
            })
            .collect();

        let resolved = self.index.resolve_sharing(&claims)?;
        for sharing in &resolved {
            if let Some(entity) = self.repository.get(sharing.key) {
                self.apply_sharing(entity, sharing)?;
            }
        }
        debug!(claims = claims.len(), resolved = resolved.len(), "resolved sharing");
        Ok(())
    }

    fn apply_sharing(&mut self, entity: Entity, sharing: &KeySharing) -> Result<()> {
        let local = self.parallel_rank();
        let key = sharing.key;
        let sharers: OrdinalSet<ProcRank> = sharing
            .sharing_procs
            .iter()
            .copied()
            .chain(std::iter::once(sharing.owner))
            .filter(|&p| p != local)
            .collect();

        self.entities.set_owner(entity, sharing.owner);
        if sharers.is_empty() {
            self.comm_list.erase_ghosting(key, GhostingOrdinal::SHARED);
            self.comm_list.change_owner(key, sharing.owner);
        } else {
            self.comm_list.insert(key, entity, sharing.owner);
            self.comm_list.change_owner(key, sharing.owner);
            for stale in self.comm_list.sharing_procs(key) {
                if !sharers.contains(stale) {
                    self.comm_list
                        .erase_info(key, EntityCommInfo::new(GhostingOrdinal::SHARED, stale));
                }
            }
            for &proc in sharers.iter() {
                self.comm_list
                    .insert_info(key, EntityCommInfo::new(GhostingOrdinal::SHARED, proc));
            }
        }

        let mut add = OrdinalSet::new();
        let mut remove = OrdinalSet::new();
        if sharing.owner == local {
            add.insert(PartOrdinal::LOCALLY_OWNED);
        } else {
            remove.insert(PartOrdinal::LOCALLY_OWNED);
        }
        if sharers.is_empty() {
            remove.insert(PartOrdinal::GLOBALLY_SHARED);
        } else {
            add.insert(PartOrdinal::GLOBALLY_SHARED);
        }
        self.internal_change_entity_parts(entity, &add, &remove)
    }

    /// Hands the deferred induced-part removals of shared entities to the
    /// distributed index and drops every candidate part no sharer still
    /// induces.
    pub(crate) fn resolve_deferred_induced_parts(&mut self) -> Result<()> {
        let deferred = std::mem::take(&mut self.deferred_induced);

        let mut local = Vec::with_capacity(deferred.len());
        for (&entity, candidates) in &deferred {
            if let Some(membership) = self.membership(entity) {
                local.push(InducedParts {
                    key: self.entity_key(entity),
                    parts: membership.induced().difference(candidates),
                });
            }
        }

        let agreed: BTreeMap<EntityKey, OrdinalSet<PartOrdinal>> = self
            .index
            .reconcile_induced_parts(&local)?
            .into_iter()
            .map(|induced| (induced.key, induced.parts))
            .collect();

        for (entity, candidates) in deferred {
            if !self.entities.is_valid(entity) {
                continue;
            }
            let key = self.entity_key(entity);
            let keep = agreed.get(&key);
            let induced = self.membership.slot_mut(entity).induced_mut();
            for &part in candidates.iter() {
                if !keep.is_some_and(|k| k.contains(part)) {
                    induced.remove(part);
                }
            }
            self.refresh_membership(entity)?;
        }
        debug!(entities = local.len(), "reconciled induced parts");
        Ok(())
    }
}
