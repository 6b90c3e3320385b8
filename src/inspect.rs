use crate::browser::{connect_or_start_browser, find_messages_page};
use anyhow::Result;

/// Survey the Messages DOM for the selectors this crate depends on. Run this
/// when the host page ships a redesign and extraction starts coming back
/// empty.
pub async fn inspect_dom(port: u16) -> Result<String> {
    let browser = connect_or_start_browser(port).await?;
    let page = find_messages_page(&browser).await?;

    let script = r#"
        (() => {
            const info = {};

            // Sidebar conversation entries
            const items = document.querySelectorAll('mws-conversation-list-item');
            info.conversationCount = items.length;
            if (items.length > 0) {
                const first = items[0];
                info.firstConversation = {
                    name: first.querySelector('.name')?.textContent?.trim(),
                    href: first.querySelector('a[href]')?.getAttribute('href'),
                    unread: !!first.querySelector('.text-content.unread'),
                    html: first.outerHTML?.substring(0, 500)
                };
            }

            // Open thread
            info.messageWrapperCount = document.querySelectorAll('mws-message-wrapper').length;
            const headings = document.querySelectorAll('h2, [data-e2e-conversation-name]');
            info.headings = Array.from(headings).slice(0, 5).map(el => ({
                tag: el.tagName,
                classes: el.className,
                text: el.textContent?.trim()?.substring(0, 100)
            }));

            // Compose surface
            const composeInput = document.querySelector('mws-message-compose textarea');
            info.composeInput = composeInput ? {
                classes: composeInput.className,
                placeholder: composeInput.getAttribute('placeholder')
            } : null;

            const sendButtons = document.querySelectorAll('mws-message-send-button button');
            info.sendButtons = Array.from(sendButtons).map(btn => {
                const rect = btn.getBoundingClientRect();
                return {
                    type: btn.getAttribute('type'),
                    disabled: btn.disabled,
                    width: rect.width,
                    height: rect.height
                };
            });

            return JSON.stringify(info, null, 2);
        })()
    "#;

    let result = page.evaluate(script).await?;
    let info = result.into_value::<String>().unwrap_or_default();
    Ok(info)
}
