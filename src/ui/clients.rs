use std::collections::HashSet;

use anyhow::Result;
use crossterm::event::{self, Event, KeyCode};
use tui::{
    backend::Backend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Span, Spans},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph},
    Frame,
};

use crate::db::DocumentId;
use crate::models::{Category, Client};
use crate::numbering::parse_sequence;
use crate::ui::context_menu::{render_context_menu, ContextMenuState, MenuEntry};
use crate::ui::{category_color, centered_rect, cycle_year, POLL_INTERVAL};
use crate::visibility::IconVisibility;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryFilter {
    All,
    Only(Category),
}

impl CategoryFilter {
    pub fn admits(&self, category: Category) -> bool {
        match self {
            CategoryFilter::All => true,
            CategoryFilter::Only(only) => *only == category,
        }
    }

    pub fn next(&self) -> CategoryFilter {
        match self {
            CategoryFilter::All => CategoryFilter::Only(Category::Deposit),
            CategoryFilter::Only(Category::Completed) => CategoryFilter::All,
            CategoryFilter::Only(category) => CategoryFilter::Only(category.next()),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            CategoryFilter::All => "All",
            CategoryFilter::Only(category) => category.label(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Row {
    Group { category: Category, count: usize },
    // Index into `clients`, plus the 1-based position inside the group
    Client { index: usize, position: usize },
}

// Represents the state of the client list screen
pub struct ClientsState {
    year: i32,
    year_options: Vec<i32>,
    filter: CategoryFilter,
    clients: Vec<Client>,
    rows: Vec<Row>,
    collapsed: HashSet<Category>,
    list_state: ListState,
    visibility: IconVisibility,
    loading: bool,
    menu: Option<ContextMenuState>,
    pending_delete: Option<DocumentId>,
    notification: Option<String>,
}

impl ClientsState {
    pub fn new(year: i32, year_options: Vec<i32>) -> Self {
        Self {
            year,
            year_options,
            filter: CategoryFilter::All,
            clients: Vec::new(),
            rows: Vec::new(),
            collapsed: HashSet::new(),
            list_state: ListState::default(),
            visibility: IconVisibility::default(),
            loading: true,
            menu: None,
            pending_delete: None,
            notification: None,
        }
    }

    /// Take a fresh snapshot from the clients subscription
    pub fn replace_clients(&mut self, clients: Vec<Client>) {
        let selected = self.selected_client().map(|client| client.id);

        self.visibility.sync(&clients);
        self.clients = clients;
        self.loading = false;
        self.rebuild_rows(selected);
    }

    fn rebuild_rows(&mut self, keep_selected: Option<DocumentId>) {
        let mut rows = Vec::new();

        for category in Category::ALL.into_iter().filter(|category| self.filter.admits(*category)) {
            let mut members: Vec<usize> = self
                .clients
                .iter()
                .enumerate()
                .filter(|(_, client)| client.year == self.year && client.category == category)
                .map(|(index, _)| index)
                .collect();
            members.sort_by_key(|&index| {
                let number = &self.clients[index].client_number;
                (parse_sequence(number).unwrap_or(u32::MAX), number.clone())
            });

            rows.push(Row::Group {
                category,
                count: members.len(),
            });
            if !self.collapsed.contains(&category) {
                rows.extend(
                    members
                        .into_iter()
                        .enumerate()
                        .map(|(i, index)| Row::Client { index, position: i + 1 }),
                );
            }
        }

        self.rows = rows;

        let restored = keep_selected.and_then(|id| {
            self.rows
                .iter()
                .position(|row| matches!(row, Row::Client { index, .. } if self.clients[*index].id == id))
        });
        let fallback = self
            .list_state
            .selected()
            .filter(|&i| i < self.rows.len())
            .or_else(|| (!self.rows.is_empty()).then_some(0));
        self.list_state.select(restored.or(fallback));
    }

    pub fn next(&mut self) {
        if self.rows.is_empty() {
            return;
        }

        let i = match self.list_state.selected() {
            Some(i) => {
                if i >= self.rows.len() - 1 {
                    0
                } else {
                    i + 1
                }
            }
            None => 0,
        };
        self.list_state.select(Some(i));
    }

    pub fn previous(&mut self) {
        if self.rows.is_empty() {
            return;
        }

        let i = match self.list_state.selected() {
            Some(i) => {
                if i == 0 {
                    self.rows.len() - 1
                } else {
                    i - 1
                }
            }
            None => 0,
        };
        self.list_state.select(Some(i));
    }

    fn selected_row(&self) -> Option<Row> {
        self.list_state.selected().and_then(|i| self.rows.get(i).copied())
    }

    pub fn selected_client(&self) -> Option<&Client> {
        match self.selected_row()? {
            Row::Client { index, .. } => self.clients.get(index),
            Row::Group { .. } => None,
        }
    }

    pub fn client(&self, id: DocumentId) -> Option<&Client> {
        self.clients.iter().find(|client| client.id == id)
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn year_options(&self) -> &[i32] {
        &self.year_options
    }

    pub fn visibility_mut(&mut self) -> &mut IconVisibility {
        &mut self.visibility
    }

    pub fn notify(&mut self, message: impl Into<String>) {
        self.notification = Some(message.into());
    }

    pub fn toggle_group(&mut self, category: Category) {
        if !self.collapsed.remove(&category) {
            self.collapsed.insert(category);
        }
        let selected = self.selected_client().map(|client| client.id);
        self.rebuild_rows(selected);
    }

    pub fn cycle_year(&mut self) {
        self.year = cycle_year(&self.year_options, self.year, true);
        self.list_state.select(None);
        self.rebuild_rows(None);
    }

    pub fn cycle_filter(&mut self) {
        self.filter = self.filter.next();
        let selected = self.selected_client().map(|client| client.id);
        self.rebuild_rows(selected);
    }

    pub fn open_menu(&mut self) {
        if let Some(client) = self.selected_client() {
            let hidden = self.visibility.is_hidden(client);
            self.menu = Some(ContextMenuState::for_client(client, hidden));
        }
    }

    fn visible_client_count(&self) -> usize {
        self.rows
            .iter()
            .map(|row| match row {
                Row::Group { count, .. } => *count,
                Row::Client { .. } => 0,
            })
            .sum()
    }
}

pub enum ClientAction {
    Quit,
    NewClient(i32), // Contains the selected year
    EditClient(DocumentId),
    MoveClient(DocumentId, Category),
    ToggleIcon(DocumentId),
    DeleteClient(DocumentId),
}

pub fn render_clients<B: Backend>(frame: &mut Frame<B>, state: &mut ClientsState) {
    let size = frame.size();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(1),
            Constraint::Length(3),
        ].as_ref())
        .split(size);

    let header = Paragraph::new(Spans::from(vec![
        Span::styled("Clients", Style::default().add_modifier(Modifier::BOLD)),
        Span::raw(format!("  |  Year: {}  |  Category: {}", state.year, state.filter.label())),
    ]))
    .block(Block::default().borders(Borders::ALL));
    frame.render_widget(header, chunks[0]);

    if state.loading {
        let loading = Paragraph::new("Loading clients...")
            .block(Block::default().borders(Borders::ALL))
            .style(Style::default().fg(Color::Gray));
        frame.render_widget(loading, chunks[1]);
    } else if state.visible_client_count() == 0 {
        let empty = Paragraph::new(format!("No clients for {}", state.year))
            .block(Block::default().borders(Borders::ALL))
            .style(Style::default().fg(Color::Gray));
        frame.render_widget(empty, chunks[1]);
    } else {
        render_client_list(frame, state, chunks[1]);
    }

    // Buttons, replaced by the notification when there is one
    let footer = match &state.notification {
        Some(message) => Paragraph::new(message.as_str()).style(Style::default().fg(Color::Red)),
        None => {
            let buttons_text = if state.selected_client().is_some() {
                "<N> New | <Enter> Actions | <E> Edit | <I> Icon | <D> Delete | <Y> Year | <F> Filter | <Q> Quit"
            } else {
                "<N> New Client | <Enter> Expand/Collapse | <Y> Year | <F> Filter | <Q> Quit"
            };
            Paragraph::new(buttons_text).style(Style::default().fg(Color::White))
        }
    };
    frame.render_widget(footer.block(Block::default().borders(Borders::TOP)), chunks[2]);

    if let Some(menu) = &mut state.menu {
        render_context_menu(frame, menu);
    }

    if let Some(name) = state.pending_delete.and_then(|id| state.client(id)).map(Client::display_name) {
        render_delete_confirmation(frame, size, &name);
    }
}

fn render_client_list<B: Backend>(frame: &mut Frame<B>, state: &mut ClientsState, area: Rect) {
    let items: Vec<ListItem> = state
        .rows
        .iter()
        .map(|row| match *row {
            Row::Group { category, count } => {
                let marker = if state.collapsed.contains(&category) { "+" } else { "-" };
                ListItem::new(Spans::from(vec![Span::styled(
                    format!("{} {} ({})", marker, category.label(), count),
                    Style::default()
                        .fg(category_color(category))
                        .add_modifier(Modifier::BOLD),
                )]))
            }
            Row::Client { index, position } => {
                let client = &state.clients[index];
                let icon = if state.visibility.is_hidden(client) {
                    Span::styled("icon hidden", Style::default().fg(Color::DarkGray))
                } else {
                    Span::styled("icon visible", Style::default().fg(Color::Green))
                };
                ListItem::new(Spans::from(vec![
                    Span::raw(format!("  {:>3}  ", position)),
                    Span::styled(format!("{:<10}", client.client_number), Style::default().fg(Color::Gray)),
                    Span::raw(format!("{:<32}", client.display_name())),
                    Span::raw(format!("{:<18}", client.phone)),
                    icon,
                ]))
            }
        })
        .collect();

    let clients_list = List::new(items)
        .block(Block::default().borders(Borders::ALL))
        .highlight_style(
            Style::default()
                .bg(Color::Blue)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        );

    frame.render_stateful_widget(clients_list, area, &mut state.list_state);
}

fn render_delete_confirmation<B: Backend>(frame: &mut Frame<B>, size: Rect, name: &str) {
    let popup_area = centered_rect(50, 25, size);

    let popup = Paragraph::new(vec![
        Spans::from(""),
        Spans::from(format!("Delete client {}?", name)),
        Spans::from(""),
        Spans::from("Contracts and the project tile will be deleted too."),
        Spans::from(""),
        Spans::from("<Y> Yes  <N> No"),
    ])
    .block(Block::default().title("Confirm Delete").borders(Borders::ALL))
    .style(Style::default().fg(Color::White).bg(Color::Black));

    frame.render_widget(Clear, popup_area);
    frame.render_widget(popup, popup_area);
}

pub fn handle_input(state: &mut ClientsState) -> Result<Option<ClientAction>> {
    if !event::poll(POLL_INTERVAL)? {
        return Ok(None);
    }

    let Event::Key(key) = event::read()? else {
        return Ok(None);
    };
    state.notification = None;

    if let Some(id) = state.pending_delete {
        match key.code {
            KeyCode::Char('y') => {
                state.pending_delete = None;
                return Ok(Some(ClientAction::DeleteClient(id)));
            }
            KeyCode::Char('n') | KeyCode::Char('q') | KeyCode::Esc => {
                state.pending_delete = None;
            }
            _ => {}
        }
        return Ok(None);
    }

    if let Some(menu) = &mut state.menu {
        match key.code {
            KeyCode::Up => menu.previous(),
            KeyCode::Down => menu.next(),
            KeyCode::Char('q') | KeyCode::Esc => state.menu = None,
            KeyCode::Enter => {
                let id = menu.client_id();
                let entry = menu.selected_entry();
                state.menu = None;

                return Ok(match entry {
                    MenuEntry::Edit => Some(ClientAction::EditClient(id)),
                    MenuEntry::MoveTo(category) => Some(ClientAction::MoveClient(id, category)),
                    MenuEntry::ToggleIcon => Some(ClientAction::ToggleIcon(id)),
                    MenuEntry::Delete => {
                        state.pending_delete = Some(id);
                        None
                    }
                });
            }
            _ => {}
        }
        return Ok(None);
    }

    let selected_id = state.selected_client().map(|client| client.id);
    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => return Ok(Some(ClientAction::Quit)),
        KeyCode::Char('n') => return Ok(Some(ClientAction::NewClient(state.year()))),
        KeyCode::Char('e') => {
            if let Some(id) = selected_id {
                return Ok(Some(ClientAction::EditClient(id)));
            }
        }
        KeyCode::Char('i') => {
            if let Some(id) = selected_id {
                return Ok(Some(ClientAction::ToggleIcon(id)));
            }
        }
        KeyCode::Char('d') => {
            state.pending_delete = selected_id;
        }
        KeyCode::Char('y') => state.cycle_year(),
        KeyCode::Char('f') => state.cycle_filter(),
        KeyCode::Down => state.next(),
        KeyCode::Up => state.previous(),
        KeyCode::Enter | KeyCode::Char('m') => match state.selected_row() {
            Some(Row::Group { category, .. }) => state.toggle_group(category),
            Some(Row::Client { .. }) => state.open_menu(),
            None => {}
        },
        _ => {}
    }
    Ok(None)
}
