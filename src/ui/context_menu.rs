use tui::{
    backend::Backend,
    style::{Color, Modifier, Style},
    text::{Span, Spans},
    widgets::{Block, Borders, Clear, List, ListItem, ListState},
    Frame,
};

use crate::db::DocumentId;
use crate::models::{Category, Client};
use crate::ui::{category_color, centered_rect};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuEntry {
    Edit,
    MoveTo(Category),
    ToggleIcon,
    Delete,
}

// Actions offered for the selected client
pub struct ContextMenuState {
    client_id: DocumentId,
    client_name: String,
    current: Category,
    icon_hidden: bool,
    entries: Vec<MenuEntry>,
    list_state: ListState,
}

impl ContextMenuState {
    pub fn for_client(client: &Client, icon_hidden: bool) -> Self {
        let mut entries = vec![MenuEntry::Edit];
        entries.extend(
            Category::ALL
                .into_iter()
                .filter(|category| *category != client.category)
                .map(MenuEntry::MoveTo),
        );
        entries.push(MenuEntry::ToggleIcon);
        entries.push(MenuEntry::Delete);

        let mut list_state = ListState::default();
        list_state.select(Some(0));

        Self {
            client_id: client.id,
            client_name: client.display_name(),
            current: client.category,
            icon_hidden,
            entries,
            list_state,
        }
    }

    pub fn client_id(&self) -> DocumentId {
        self.client_id
    }

    #[cfg(test)]
    pub fn entries(&self) -> &[MenuEntry] {
        &self.entries
    }

    pub fn next(&mut self) {
        let i = match self.list_state.selected() {
            Some(i) if i + 1 < self.entries.len() => i + 1,
            _ => 0,
        };
        self.list_state.select(Some(i));
    }

    pub fn previous(&mut self) {
        let i = match self.list_state.selected() {
            Some(0) | None => self.entries.len() - 1,
            Some(i) => i - 1,
        };
        self.list_state.select(Some(i));
    }

    pub fn selected_entry(&self) -> MenuEntry {
        self.list_state
            .selected()
            .and_then(|i| self.entries.get(i).copied())
            .unwrap_or(MenuEntry::Edit)
    }

    fn label(&self, entry: MenuEntry) -> String {
        match entry {
            MenuEntry::Edit => "Edit".to_string(),
            MenuEntry::MoveTo(category) => format!("Move to \"{}\"", category.label()),
            MenuEntry::ToggleIcon if self.icon_hidden => "Show project icon".to_string(),
            MenuEntry::ToggleIcon => "Hide project icon".to_string(),
            MenuEntry::Delete => "Delete".to_string(),
        }
    }
}

pub fn render_context_menu<B: Backend>(frame: &mut Frame<B>, state: &mut ContextMenuState) {
    let area = centered_rect(40, 40, frame.size());

    let items: Vec<ListItem> = state
        .entries
        .iter()
        .map(|entry| {
            let style = match entry {
                MenuEntry::MoveTo(category) => Style::default().fg(category_color(*category)),
                MenuEntry::Delete => Style::default().fg(Color::Red),
                _ => Style::default(),
            };
            ListItem::new(Spans::from(vec![Span::styled(state.label(*entry), style)]))
        })
        .collect();

    let title = Span::styled(
        format!("{} ({})", state.client_name, state.current.label()),
        Style::default().fg(category_color(state.current)),
    );

    let menu = List::new(items)
        .block(Block::default().title(title).borders(Borders::ALL))
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED));

    frame.render_widget(Clear, area);
    frame.render_stateful_widget(menu, area, &mut state.list_state);
}
