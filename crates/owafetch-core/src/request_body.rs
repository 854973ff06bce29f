//! WebDAV request bodies (pure functions, testable).
//!
//! Exchange OWA needs four XML payloads: the `PROPFIND` that locates the
//! inbox, the `SEARCH` that lists its messages, and the two batch
//! mutations (`BPROPPATCH`, `BDELETE`).  The mutations are sent to the
//! inbox collection, so they address the message by the last segment of
//! its href, which the collection resolves relative to itself.

use crate::normalize::normalize_resource_name;

/// Content type sent with every XML request body.
pub const XML_CONTENT_TYPE: &str = "text/xml; charset=\"utf-8\"";

/// Filter appended to the search query when only unread mail is wanted.
const UNREAD_FILTER: &str = " AND \"urn:schemas:httpmail:read\"= False";

/// Build the `PROPFIND` body requesting the `httpmail:inbox` property.
pub fn inbox_lookup_body() -> String {
    "<?xml version=\"1.0\" encoding=\"utf-8\" ?>\n\
     <D:propfind xmlns:D=\"DAV:\" xmlns:a=\"urn:schemas:httpmail:\">\n\
     \x20 <D:prop>\n\
     \x20   <a:inbox/>\n\
     \x20 </D:prop>\n\
     </D:propfind>\n"
        .to_string()
}

/// Build the `SEARCH` body listing the messages of a folder.
///
/// Collections and hidden items are always excluded and results are
/// ordered by creation date, oldest first.  Unless `include_read` is set,
/// messages already marked read are filtered out as well.
pub fn list_messages_body(include_read: bool) -> String {
    let read_filter = if include_read { "" } else { UNREAD_FILTER };
    format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\" ?>\n\
         <searchrequest xmlns=\"DAV:\">\n\
         \x20 <sql>\n\
         \x20   SELECT \"urn:schemas:httpmail:fromemail\", \
         \"urn:schemas:httpmail:subject\", \
         \"urn:schemas:httpmail:read\"\n\
         \x20   FROM \"\"\n\
         \x20   WHERE &quot;DAV:iscollection&quot; = False \
         AND &quot;DAV:ishidden&quot; = False{read_filter}\n\
         \x20   ORDER BY \"DAV:creationdate\"\n\
         \x20 </sql>\n\
         </searchrequest>\n"
    )
}

/// Build the `BPROPPATCH` body setting `httpmail:read` on one message.
pub fn mark_as_read_body(href: &str) -> String {
    let target = batch_target(href);
    format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\" ?>\n\
         <D:propertyupdate xmlns:D=\"DAV:\" xmlns:a=\"urn:schemas:httpmail:\">\n\
         \x20 <D:target><D:href>{target}</D:href></D:target>\n\
         \x20 <D:set><D:prop><a:read>1</a:read></D:prop></D:set>\n\
         </D:propertyupdate>\n"
    )
}

/// Build the `BDELETE` body removing one message.
///
/// This is a hard delete; the message does not go to "Deleted Items".
pub fn delete_body(href: &str) -> String {
    let target = batch_target(href);
    format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\" ?>\n\
         <D:delete xmlns:D=\"DAV:\" xmlns:a=\"urn:schemas:httpmail:\">\n\
         \x20 <D:target><D:href>{target}</D:href></D:target>\n\
         </D:delete>\n"
    )
}

/// Return the text after the final `/` of an href (the whole input if it
/// has no `/`).
pub fn last_path_segment(href: &str) -> &str {
    href.rsplit('/').next().unwrap_or(href)
}

fn batch_target(href: &str) -> String {
    normalize_resource_name(last_path_segment(href))
}
