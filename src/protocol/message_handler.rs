use log::debug;
use std::net::SocketAddr;
use std::time::Instant;

use super::RouterContext;
use super::messages::Advertisement;

/// Decodes one inbound datagram and merges it into the table. Malformed
/// datagrams and datagrams whose source does not match a configured
/// neighbor are dropped and counted.
pub(crate) async fn handle_datagram(ctx: &RouterContext, payload: &[u8], from: SocketAddr) {
    let advertisement = match Advertisement::decode(payload) {
        Ok(advertisement) => advertisement,
        Err(e) => {
            debug!("Dropping malformed datagram from {}: {}", from, e);
            ctx.stats.record_malformed();
            return;
        }
    };

    let mut engine = ctx.engine.lock().await;
    let Some(neighbor_id) = engine.neighbors().lookup_by_addr(from).map(|n| n.id.clone()) else {
        debug!("Dropping vector from unconfigured address {}", from);
        ctx.stats.record_unknown_sender();
        return;
    };
    if neighbor_id != advertisement.sender_id {
        debug!(
            "Dropping vector from {}: claims to be {} but address belongs to {}",
            from, advertisement.sender_id, neighbor_id
        );
        ctx.stats.record_unknown_sender();
        return;
    }

    debug!(
        "Received vector from {} with {} destinations",
        neighbor_id,
        advertisement.vector.len()
    );
    let Some(change) =
        engine.process_advertisement(&neighbor_id, &advertisement.vector, Instant::now())
    else {
        return;
    };
    ctx.stats.record_processed();
    if !change.unmapped.is_empty() {
        ctx.stats.record_unmapped(change.unmapped.len() as u64);
    }
    ctx.publish(&engine, &change, "advertisement");
}
