use std::collections::{HashMap, HashSet};

use crate::api::PlaylistState;
use crate::model::Playlist;

/// Merge the server's playlists with locally pending ones.
///
/// A pending local playlist wins over the server copy with the same id, and
/// pending playlists the server has never seen are kept. Everything else
/// comes from the server. The result replaces the whole local collection.
pub fn reconcile_playlists(server: &[PlaylistState], local_pending: &[Playlist]) -> Vec<Playlist> {
    let pending_by_id: HashMap<&str, &Playlist> = local_pending
        .iter()
        .map(|p| (p.id.as_str(), p))
        .collect();

    let mut merged: Vec<Playlist> = server
        .iter()
        .map(|remote| match pending_by_id.get(remote.id.as_str()) {
            Some(local) => (*local).clone(),
            None => Playlist::from_server(remote.id.clone(), remote.name.clone(), remote.tracks.clone()),
        })
        .collect();

    let server_ids: HashSet<&str> = server.iter().map(|p| p.id.as_str()).collect();
    merged.extend(
        local_pending
            .iter()
            .filter(|p| !server_ids.contains(p.id.as_str()))
            .cloned(),
    );
    merged
}
